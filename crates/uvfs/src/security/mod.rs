//! Security descriptors and the POSIX permission translation layer.
//!
//! Descriptors travel as Windows self-relative `SECURITY_DESCRIPTOR` blobs:
//! a 20-byte header followed by the owner SID, the group SID and the DACL.
//! SACLs are not modelled; a SACL offset in an incoming blob is ignored.

pub mod sddl;
pub mod translator;

pub use translator::{PosixOwnership, SecurityTranslator};

use crate::error::{FsError, Result};
use std::fmt;
use std::str::FromStr;

pub const FILE_READ_DATA: u32 = 0x0000_0001;
pub const FILE_WRITE_DATA: u32 = 0x0000_0002;
pub const FILE_APPEND_DATA: u32 = 0x0000_0004;
pub const FILE_READ_EA: u32 = 0x0000_0008;
pub const FILE_WRITE_EA: u32 = 0x0000_0010;
pub const FILE_EXECUTE: u32 = 0x0000_0020;
pub const FILE_DELETE_CHILD: u32 = 0x0000_0040;
pub const FILE_READ_ATTRIBUTES: u32 = 0x0000_0080;
pub const FILE_WRITE_ATTRIBUTES: u32 = 0x0000_0100;
pub const DELETE: u32 = 0x0001_0000;
pub const READ_CONTROL: u32 = 0x0002_0000;
pub const WRITE_DAC: u32 = 0x0004_0000;
pub const WRITE_OWNER: u32 = 0x0008_0000;
pub const SYNCHRONIZE: u32 = 0x0010_0000;

pub const FILE_GENERIC_READ: u32 =
    READ_CONTROL | FILE_READ_DATA | FILE_READ_ATTRIBUTES | FILE_READ_EA | SYNCHRONIZE;
pub const FILE_GENERIC_WRITE: u32 = READ_CONTROL
    | FILE_WRITE_DATA
    | FILE_WRITE_ATTRIBUTES
    | FILE_WRITE_EA
    | FILE_APPEND_DATA
    | SYNCHRONIZE;
pub const FILE_GENERIC_EXECUTE: u32 =
    READ_CONTROL | FILE_READ_ATTRIBUTES | FILE_EXECUTE | SYNCHRONIZE;
pub const FILE_ALL_ACCESS: u32 = 0x001F_01FF;

pub const GENERIC_READ: u32 = 0x8000_0000;
pub const GENERIC_WRITE: u32 = 0x4000_0000;
pub const GENERIC_EXECUTE: u32 = 0x2000_0000;
pub const GENERIC_ALL: u32 = 0x1000_0000;

/// Replace generic rights with the file-specific rights they stand for.
pub fn map_generic(mask: u32) -> u32 {
    let mut mapped = mask & !(GENERIC_READ | GENERIC_WRITE | GENERIC_EXECUTE | GENERIC_ALL);
    if mask & GENERIC_READ != 0 {
        mapped |= FILE_GENERIC_READ;
    }
    if mask & GENERIC_WRITE != 0 {
        mapped |= FILE_GENERIC_WRITE;
    }
    if mask & GENERIC_EXECUTE != 0 {
        mapped |= FILE_GENERIC_EXECUTE;
    }
    if mask & GENERIC_ALL != 0 {
        mapped |= FILE_ALL_ACCESS;
    }
    mapped
}

const SE_DACL_PRESENT: u16 = 0x0004;
const SE_DACL_PROTECTED: u16 = 0x1000;
const SE_SELF_RELATIVE: u16 = 0x8000;

const SD_REVISION: u8 = 1;
const SD_HEADER_LEN: usize = 20;
const SID_REVISION: u8 = 1;
const SID_MAX_SUB_AUTHORITIES: usize = 15;
const ACL_REVISION: u8 = 2;
const ACL_REVISION_DS: u8 = 4;
const ACL_HEADER_LEN: usize = 8;
const ACE_HEADER_LEN: usize = 8;

fn malformed(reason: impl Into<String>) -> FsError {
    FsError::InvalidSecurityDescriptor {
        reason: reason.into(),
    }
}

fn read_u16(buf: &[u8], off: usize) -> Result<u16> {
    match buf.get(off..off + 2) {
        Some(b) => Ok(u16::from_le_bytes([b[0], b[1]])),
        None => Err(malformed(format!("truncated at offset {}", off))),
    }
}

fn read_u32(buf: &[u8], off: usize) -> Result<u32> {
    match buf.get(off..off + 4) {
        Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(malformed(format!("truncated at offset {}", off))),
    }
}

/// A security identifier such as `S-1-5-18`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sid {
    authority: u64,
    sub_authorities: Vec<u32>,
}

impl Sid {
    pub const EVERYONE: &'static str = "S-1-1-0";
    pub const LOCAL_SYSTEM: &'static str = "S-1-5-18";
    pub const ADMINISTRATORS: &'static str = "S-1-5-32-544";

    pub fn new(authority: u64, sub_authorities: Vec<u32>) -> Result<Self> {
        if authority >= 1 << 48 {
            return Err(malformed("identifier authority exceeds 48 bits"));
        }
        if sub_authorities.len() > SID_MAX_SUB_AUTHORITIES {
            return Err(malformed("too many sub-authorities"));
        }
        Ok(Self {
            authority,
            sub_authorities,
        })
    }

    pub fn everyone() -> Self {
        Self {
            authority: 1,
            sub_authorities: vec![0],
        }
    }

    pub fn authority(&self) -> u64 {
        self.authority
    }

    pub fn sub_authorities(&self) -> &[u32] {
        &self.sub_authorities
    }

    pub fn byte_len(&self) -> usize {
        8 + 4 * self.sub_authorities.len()
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(SID_REVISION);
        out.push(self.sub_authorities.len() as u8);
        out.extend_from_slice(&self.authority.to_be_bytes()[2..]);
        for sub in &self.sub_authorities {
            out.extend_from_slice(&sub.to_le_bytes());
        }
    }

    fn read(buf: &[u8], off: usize) -> Result<Sid> {
        let header = buf
            .get(off..off + 8)
            .ok_or_else(|| malformed("truncated SID"))?;
        if header[0] != SID_REVISION {
            return Err(malformed(format!("unsupported SID revision {}", header[0])));
        }
        let count = header[1] as usize;
        if count > SID_MAX_SUB_AUTHORITIES {
            return Err(malformed("too many sub-authorities"));
        }
        let authority = header[2..8]
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        let sub_authorities = (0..count)
            .map(|i| read_u32(buf, off + 8 + 4 * i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Sid {
            authority,
            sub_authorities,
        })
    }
}

impl FromStr for Sid {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('-');
        if parts.next() != Some("S") || parts.next() != Some("1") {
            return Err(malformed(format!("bad SID string: {}", s)));
        }
        let authority = parts
            .next()
            .and_then(|a| a.parse::<u64>().ok())
            .ok_or_else(|| malformed(format!("bad SID authority: {}", s)))?;
        let sub_authorities = parts
            .map(|p| {
                p.parse::<u32>()
                    .map_err(|_| malformed(format!("bad SID sub-authority: {}", s)))
            })
            .collect::<Result<Vec<_>>>()?;
        Sid::new(authority, sub_authorities)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-1-{}", self.authority)?;
        for sub in &self.sub_authorities {
            write!(f, "-{}", sub)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AceType {
    Allow,
    Deny,
}

impl AceType {
    fn code(self) -> u8 {
        match self {
            AceType::Allow => 0,
            AceType::Deny => 1,
        }
    }
}

/// One access control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ace {
    pub ace_type: AceType,
    pub flags: u8,
    pub mask: u32,
    pub sid: Sid,
}

impl Ace {
    pub fn allow(sid: Sid, mask: u32) -> Self {
        Self {
            ace_type: AceType::Allow,
            flags: 0,
            mask,
            sid,
        }
    }

    pub fn deny(sid: Sid, mask: u32) -> Self {
        Self {
            ace_type: AceType::Deny,
            flags: 0,
            mask,
            sid,
        }
    }

    fn byte_len(&self) -> usize {
        ACE_HEADER_LEN + self.sid.byte_len()
    }
}

/// Selects which parts of a descriptor a SetSecurity request replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityInformation(pub u32);

impl SecurityInformation {
    pub const OWNER: u32 = 0x1;
    pub const GROUP: u32 = 0x2;
    pub const DACL: u32 = 0x4;
    pub const SACL: u32 = 0x8;

    pub fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }
}

/// An owner, a group and an optional DACL.
///
/// `dacl: None` is a null DACL (everyone has full access); `Some(vec![])`
/// grants nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityDescriptor {
    owner: Option<Sid>,
    group: Option<Sid>,
    dacl: Option<Vec<Ace>>,
    dacl_protected: bool,
}

impl SecurityDescriptor {
    pub fn new(owner: Option<Sid>, group: Option<Sid>, dacl: Option<Vec<Ace>>) -> Self {
        Self {
            owner,
            group,
            dacl,
            dacl_protected: false,
        }
    }

    pub fn protected(mut self) -> Self {
        self.dacl_protected = true;
        self
    }

    pub fn owner(&self) -> Option<&Sid> {
        self.owner.as_ref()
    }

    pub fn group(&self) -> Option<&Sid> {
        self.group.as_ref()
    }

    pub fn dacl(&self) -> Option<&[Ace]> {
        self.dacl.as_deref()
    }

    pub fn is_dacl_protected(&self) -> bool {
        self.dacl_protected
    }

    /// Serialize as a self-relative descriptor.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut control = SE_SELF_RELATIVE;
        if self.dacl.is_some() {
            control |= SE_DACL_PRESENT;
        }
        if self.dacl_protected {
            control |= SE_DACL_PROTECTED;
        }

        let mut offset = SD_HEADER_LEN;
        let owner_off = self.owner.as_ref().map(|sid| {
            let at = offset;
            offset += sid.byte_len();
            at
        });
        let group_off = self.group.as_ref().map(|sid| {
            let at = offset;
            offset += sid.byte_len();
            at
        });
        let dacl_off = self.dacl.as_ref().map(|_| offset);

        let mut out = Vec::with_capacity(offset + 64);
        out.push(SD_REVISION);
        out.push(0);
        out.extend_from_slice(&control.to_le_bytes());
        for off in [owner_off, group_off, None, dacl_off] {
            out.extend_from_slice(&(off.unwrap_or(0) as u32).to_le_bytes());
        }
        if let Some(owner) = &self.owner {
            owner.write(&mut out);
        }
        if let Some(group) = &self.group {
            group.write(&mut out);
        }
        if let Some(aces) = &self.dacl {
            let size = ACL_HEADER_LEN + aces.iter().map(Ace::byte_len).sum::<usize>();
            out.push(ACL_REVISION);
            out.push(0);
            out.extend_from_slice(&(size as u16).to_le_bytes());
            out.extend_from_slice(&(aces.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            for ace in aces {
                out.push(ace.ace_type.code());
                out.push(ace.flags);
                out.extend_from_slice(&(ace.byte_len() as u16).to_le_bytes());
                out.extend_from_slice(&ace.mask.to_le_bytes());
                ace.sid.write(&mut out);
            }
        }
        out
    }

    /// Parse and validate a self-relative descriptor.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < SD_HEADER_LEN {
            return Err(malformed("truncated header"));
        }
        if buf[0] != SD_REVISION {
            return Err(malformed(format!("unsupported revision {}", buf[0])));
        }
        let control = read_u16(buf, 2)?;
        if control & SE_SELF_RELATIVE == 0 {
            return Err(malformed("descriptor is not self-relative"));
        }
        let owner_off = read_u32(buf, 4)? as usize;
        let group_off = read_u32(buf, 8)? as usize;
        let dacl_off = read_u32(buf, 16)? as usize;

        let owner = match owner_off {
            0 => None,
            off => Some(Sid::read(buf, off)?),
        };
        let group = match group_off {
            0 => None,
            off => Some(Sid::read(buf, off)?),
        };
        let dacl = if control & SE_DACL_PRESENT != 0 && dacl_off != 0 {
            Some(read_acl(buf, dacl_off)?)
        } else {
            None
        };
        Ok(Self {
            owner,
            group,
            dacl,
            dacl_protected: control & SE_DACL_PROTECTED != 0,
        })
    }

    /// Parse the SDDL subset understood by [`sddl::parse`].
    pub fn from_sddl(text: &str) -> Result<Self> {
        sddl::parse(text)
    }

    pub fn to_sddl(&self) -> String {
        sddl::format(self)
    }

    /// Apply the parts of `modification` selected by `info`, returning the
    /// new descriptor. SACL selections are accepted and ignored.
    pub fn evolve(&self, info: SecurityInformation, modification: &SecurityDescriptor) -> Result<Self> {
        let mut next = self.clone();
        if info.has(SecurityInformation::OWNER) {
            next.owner = Some(
                modification
                    .owner
                    .clone()
                    .ok_or_else(|| malformed("owner selected but absent"))?,
            );
        }
        if info.has(SecurityInformation::GROUP) {
            next.group = Some(
                modification
                    .group
                    .clone()
                    .ok_or_else(|| malformed("group selected but absent"))?,
            );
        }
        if info.has(SecurityInformation::DACL) {
            next.dacl = modification.dacl.clone();
            next.dacl_protected = modification.dacl_protected;
        }
        Ok(next)
    }
}

impl fmt::Display for SecurityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sddl())
    }
}

fn read_acl(buf: &[u8], off: usize) -> Result<Vec<Ace>> {
    let header = buf
        .get(off..off + ACL_HEADER_LEN)
        .ok_or_else(|| malformed("truncated ACL header"))?;
    if header[0] != ACL_REVISION && header[0] != ACL_REVISION_DS {
        return Err(malformed(format!("unsupported ACL revision {}", header[0])));
    }
    let size = read_u16(buf, off + 2)? as usize;
    let count = read_u16(buf, off + 4)? as usize;
    let end = off + size;
    if size < ACL_HEADER_LEN || end > buf.len() {
        return Err(malformed("ACL size out of bounds"));
    }

    let mut aces = Vec::with_capacity(count);
    let mut pos = off + ACL_HEADER_LEN;
    for _ in 0..count {
        if pos + ACE_HEADER_LEN > end {
            return Err(malformed("ACE header past end of ACL"));
        }
        let ace_type = match buf[pos] {
            0 => AceType::Allow,
            1 => AceType::Deny,
            other => return Err(malformed(format!("unsupported ACE type {}", other))),
        };
        let flags = buf[pos + 1];
        let ace_size = read_u16(buf, pos + 2)? as usize;
        if ace_size < ACE_HEADER_LEN || pos + ace_size > end {
            return Err(malformed("ACE size out of bounds"));
        }
        let mask = read_u32(buf, pos + 4)?;
        let sid = Sid::read(&buf[..pos + ace_size], pos + ACE_HEADER_LEN)?;
        aces.push(Ace {
            ace_type,
            flags,
            mask,
            sid,
        });
        pos += ace_size;
    }
    Ok(aces)
}
