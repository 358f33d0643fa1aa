//! A subset of the Security Descriptor Definition Language.
//!
//! Supported: `O:`, `G:` and `D:` sections, DACL flags `P`, `AI`, `AR` and
//! `NO_ACCESS_CONTROL`, allow/deny ACEs with `OI CI NP IO ID` flags, rights
//! as `FA FR FW FX GA GR GW GX SD RC WD WO` tokens or a hex mask, and the
//! SID aliases `SY BA BU AU WD CO CG`. An `S:` section is parsed and dropped.

use super::{
    Ace, AceType, SecurityDescriptor, Sid, DELETE, FILE_ALL_ACCESS, FILE_GENERIC_EXECUTE,
    FILE_GENERIC_READ, FILE_GENERIC_WRITE, GENERIC_ALL, GENERIC_EXECUTE, GENERIC_READ,
    GENERIC_WRITE, READ_CONTROL, WRITE_DAC, WRITE_OWNER,
};
use crate::error::{FsError, Result};
use std::fmt::Write;

const ACE_FLAGS: [(&str, u8); 5] = [("OI", 0x01), ("CI", 0x02), ("NP", 0x04), ("IO", 0x08), ("ID", 0x10)];

const RIGHTS: [(&str, u32); 12] = [
    ("FA", FILE_ALL_ACCESS),
    ("FR", FILE_GENERIC_READ),
    ("FW", FILE_GENERIC_WRITE),
    ("FX", FILE_GENERIC_EXECUTE),
    ("GA", GENERIC_ALL),
    ("GR", GENERIC_READ),
    ("GW", GENERIC_WRITE),
    ("GX", GENERIC_EXECUTE),
    ("SD", DELETE),
    ("RC", READ_CONTROL),
    ("WD", WRITE_DAC),
    ("WO", WRITE_OWNER),
];

fn bad(reason: impl Into<String>) -> FsError {
    FsError::InvalidSecurityDescriptor {
        reason: reason.into(),
    }
}

fn alias(token: &str) -> Option<&'static str> {
    match token {
        "SY" => Some("S-1-5-18"),
        "BA" => Some("S-1-5-32-544"),
        "BU" => Some("S-1-5-32-545"),
        "AU" => Some("S-1-5-11"),
        "WD" => Some("S-1-1-0"),
        "CO" => Some("S-1-3-0"),
        "CG" => Some("S-1-3-1"),
        _ => None,
    }
}

/// Parse a SID string or two-letter alias at the start of `s`.
fn take_sid(s: &str) -> Result<(Sid, &str)> {
    if s.starts_with("S-") {
        let tail = &s[1..];
        let len = tail
            .find(|c: char| !(c.is_ascii_digit() || c == '-'))
            .unwrap_or(tail.len());
        let sid = s[..len + 1].parse()?;
        return Ok((sid, &tail[len..]));
    }
    let token = s.get(..2).ok_or_else(|| bad(format!("missing SID in {:?}", s)))?;
    let full = alias(token).ok_or_else(|| bad(format!("unknown SID alias {:?}", token)))?;
    Ok((full.parse()?, &s[2..]))
}

fn parse_sid(s: &str) -> Result<Sid> {
    let (sid, rest) = take_sid(s)?;
    if !rest.is_empty() {
        return Err(bad(format!("trailing characters after SID: {:?}", rest)));
    }
    Ok(sid)
}

/// Split `s` into two-letter tokens; anything but ASCII pairs is rejected.
fn pairs<'a>(s: &'a str, what: &str) -> Result<Vec<&'a str>> {
    if !s.is_ascii() || s.len() % 2 != 0 {
        return Err(bad(format!("bad {} {:?}", what, s)));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .ok_or_else(|| bad(format!("bad {} {:?}", what, s)))
        })
        .collect()
}

fn parse_ace_flags(s: &str) -> Result<u8> {
    let mut flags = 0;
    for token in pairs(s, "ACE flags")? {
        let bit = ACE_FLAGS
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, bit)| *bit)
            .ok_or_else(|| bad(format!("unknown ACE flag {:?}", token)))?;
        flags |= bit;
    }
    Ok(flags)
}

fn parse_rights(s: &str) -> Result<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).map_err(|_| bad(format!("bad rights mask {:?}", s)));
    }
    if s.is_empty() {
        return Err(bad("empty rights"));
    }
    let mut mask = 0;
    for token in pairs(s, "rights")? {
        mask |= RIGHTS
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, bits)| *bits)
            .ok_or_else(|| bad(format!("unknown right {:?}", token)))?;
    }
    Ok(mask)
}

fn parse_ace(body: &str) -> Result<Ace> {
    let fields: Vec<&str> = body.split(';').collect();
    if fields.len() != 6 {
        return Err(bad(format!("ACE needs 6 fields: {:?}", body)));
    }
    let ace_type = match fields[0] {
        "A" => AceType::Allow,
        "D" => AceType::Deny,
        other => return Err(bad(format!("unsupported ACE type {:?}", other))),
    };
    if !fields[3].is_empty() || !fields[4].is_empty() {
        return Err(bad("object ACEs are not supported"));
    }
    Ok(Ace {
        ace_type,
        flags: parse_ace_flags(fields[1])?,
        mask: parse_rights(fields[2])?,
        sid: parse_sid(fields[5])?,
    })
}

fn is_section_start(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('O' | 'G' | 'D' | 'S'), Some(':'))
    )
}

/// Split the ACL flags and ACE list of a `D:` or `S:` section.
fn take_acl(s: &str) -> Result<(String, Vec<Ace>, &str)> {
    let mut rest = s;
    let mut flags = String::new();
    while let Some(c) = rest.chars().next() {
        if c == '(' || is_section_start(rest) {
            break;
        }
        flags.push(c);
        rest = &rest[c.len_utf8()..];
    }
    let mut aces = Vec::new();
    while let Some(inner) = rest.strip_prefix('(') {
        let close = inner
            .find(')')
            .ok_or_else(|| bad("unterminated ACE"))?;
        aces.push(parse_ace(&inner[..close])?);
        rest = &inner[close + 1..];
    }
    Ok((flags, aces, rest))
}

pub fn parse(text: &str) -> Result<SecurityDescriptor> {
    let mut sd = SecurityDescriptor::default();
    let mut rest = text.trim();
    while !rest.is_empty() {
        if !is_section_start(rest) {
            return Err(bad(format!("expected section at {:?}", rest)));
        }
        let (tag, body) = (&rest[..1], &rest[2..]);
        match tag {
            "O" => {
                let (sid, tail) = take_sid(body)?;
                sd.owner = Some(sid);
                rest = tail;
            }
            "G" => {
                let (sid, tail) = take_sid(body)?;
                sd.group = Some(sid);
                rest = tail;
            }
            "D" => {
                let (flags, aces, tail) = take_acl(body)?;
                if flags.contains("NO_ACCESS_CONTROL") {
                    sd.dacl = None;
                } else {
                    sd.dacl = Some(aces);
                }
                sd.dacl_protected = flags.starts_with('P');
                rest = tail;
            }
            _ => {
                let (_, _, tail) = take_acl(body)?;
                rest = tail;
            }
        }
    }
    Ok(sd)
}

pub fn format(sd: &SecurityDescriptor) -> String {
    let mut out = String::new();
    if let Some(owner) = sd.owner() {
        let _ = write!(out, "O:{}", owner);
    }
    if let Some(group) = sd.group() {
        let _ = write!(out, "G:{}", group);
    }
    out.push_str("D:");
    if sd.is_dacl_protected() {
        out.push('P');
    }
    match sd.dacl() {
        None => out.push_str("NO_ACCESS_CONTROL"),
        Some(aces) => {
            for ace in aces {
                let kind = match ace.ace_type {
                    AceType::Allow => "A",
                    AceType::Deny => "D",
                };
                let flags: String = ACE_FLAGS
                    .iter()
                    .filter(|(_, bit)| ace.flags & bit != 0)
                    .map(|(name, _)| *name)
                    .collect();
                let _ = write!(out, "({};{};0x{:x};;;{})", kind, flags, ace.mask, ace.sid);
            }
        }
    }
    out
}
