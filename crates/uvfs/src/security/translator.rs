//! POSIX uid/gid/mode to security descriptor translation.
//!
//! Users map to `S-1-22-1-<uid>` and groups to `S-1-22-2-<gid>`. When
//! decoding, `S-1-5-18` (SYSTEM) and `S-1-5-32-544` (Administrators) are
//! also accepted and map to id 0; any other SID is unmappable.
//!
//! Only the nine permission bits survive a round trip. Setuid, setgid,
//! sticky and file-type bits are dropped when encoding.

use super::{
    map_generic, Ace, AceType, SecurityDescriptor, Sid, DELETE, FILE_APPEND_DATA, FILE_EXECUTE,
    FILE_GENERIC_EXECUTE, FILE_GENERIC_READ, FILE_GENERIC_WRITE, FILE_READ_DATA,
    FILE_WRITE_ATTRIBUTES, FILE_WRITE_DATA, FILE_WRITE_EA, READ_CONTROL, WRITE_DAC, WRITE_OWNER,
};
use crate::error::{FsError, Result};
use tracing::debug;

const UNIX_USER_AUTHORITY: u64 = 22;
const UNIX_USER_RID: u32 = 1;
const UNIX_GROUP_RID: u32 = 2;

/// Permission bits preserved by translation.
pub const MODE_PERMISSION_MASK: u32 = 0o777;

/// Rights the owner always holds on top of its rwx bits.
const OWNER_EXTRA_RIGHTS: u32 =
    WRITE_DAC | WRITE_OWNER | DELETE | READ_CONTROL | FILE_WRITE_ATTRIBUTES | FILE_WRITE_EA;

const R: u32 = 0o4;
const W: u32 = 0o2;
const X: u32 = 0o1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PosixOwnership {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

impl PosixOwnership {
    pub fn new(uid: u32, gid: u32, mode: u32) -> Self {
        Self { uid, gid, mode }
    }
}

fn allow_rights(bits: u32) -> u32 {
    let mut mask = 0;
    if bits & R != 0 {
        mask |= FILE_GENERIC_READ;
    }
    if bits & W != 0 {
        mask |= FILE_GENERIC_WRITE;
    }
    if bits & X != 0 {
        mask |= FILE_GENERIC_EXECUTE;
    }
    mask
}

/// Deny entries only name the rights that distinguish r, w and x, so they
/// never take away shared rights such as `READ_CONTROL`.
fn deny_rights(bits: u32) -> u32 {
    let mut mask = 0;
    if bits & R != 0 {
        mask |= FILE_READ_DATA;
    }
    if bits & W != 0 {
        mask |= FILE_WRITE_DATA | FILE_APPEND_DATA;
    }
    if bits & X != 0 {
        mask |= FILE_EXECUTE;
    }
    mask
}

fn rights_to_bits(mask: u32) -> u32 {
    let mask = map_generic(mask);
    let mut bits = 0;
    if mask & FILE_READ_DATA != 0 {
        bits |= R;
    }
    if mask & FILE_WRITE_DATA != 0 {
        bits |= W;
    }
    if mask & FILE_EXECUTE != 0 {
        bits |= X;
    }
    bits
}

/// Converts between POSIX ownership and security descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityTranslator;

impl SecurityTranslator {
    pub fn uid_to_sid(uid: u32) -> Sid {
        Sid {
            authority: UNIX_USER_AUTHORITY,
            sub_authorities: vec![UNIX_USER_RID, uid],
        }
    }

    pub fn gid_to_sid(gid: u32) -> Sid {
        Sid {
            authority: UNIX_USER_AUTHORITY,
            sub_authorities: vec![UNIX_GROUP_RID, gid],
        }
    }

    pub fn sid_to_uid(sid: &Sid) -> Result<u32> {
        Self::sid_to_id(sid, UNIX_USER_RID)
    }

    pub fn sid_to_gid(sid: &Sid) -> Result<u32> {
        Self::sid_to_id(sid, UNIX_GROUP_RID)
    }

    fn sid_to_id(sid: &Sid, rid: u32) -> Result<u32> {
        match (sid.authority(), sid.sub_authorities()) {
            (UNIX_USER_AUTHORITY, [kind, id]) if *kind == rid => Ok(*id),
            (5, [18]) | (5, [32, 544]) => Ok(0),
            _ => Err(FsError::UnmappableIdentity {
                sid: sid.to_string(),
            }),
        }
    }

    /// Build a descriptor granting the owner, group and everyone the rights
    /// in `mode`, with deny entries so that a class never gains rights from
    /// a broader class.
    pub fn posix_to_descriptor(ownership: PosixOwnership) -> SecurityDescriptor {
        let owner = Self::uid_to_sid(ownership.uid);
        let group = Self::gid_to_sid(ownership.gid);
        let mode = ownership.mode & MODE_PERMISSION_MASK;
        let owner_bits = (mode >> 6) & 0o7;
        let group_bits = (mode >> 3) & 0o7;
        let other_bits = mode & 0o7;

        let mut aces = Vec::with_capacity(5);
        let owner_deny = deny_rights(other_bits & !owner_bits);
        if owner_deny != 0 {
            aces.push(Ace::deny(owner.clone(), owner_deny));
        }
        aces.push(Ace::allow(
            owner.clone(),
            allow_rights(owner_bits) | OWNER_EXTRA_RIGHTS,
        ));
        let group_deny = deny_rights(other_bits & !group_bits);
        if group_deny != 0 {
            aces.push(Ace::deny(group.clone(), group_deny));
        }
        if group_bits != 0 {
            aces.push(Ace::allow(group.clone(), allow_rights(group_bits)));
        }
        if other_bits != 0 {
            aces.push(Ace::allow(Sid::everyone(), allow_rights(other_bits)));
        }

        debug!(
            uid = ownership.uid,
            gid = ownership.gid,
            mode = %format_args!("{:o}", mode),
            aces = aces.len(),
            "Built security descriptor from posix ownership"
        );
        SecurityDescriptor::new(Some(owner), Some(group), Some(aces))
    }

    /// Recover uid, gid and the nine permission bits.
    ///
    /// ACEs are evaluated in order: the owner class matches the owner SID
    /// and Everyone, the group class the group SID and Everyone, and the
    /// other class Everyone only. A null DACL yields `0o777`.
    pub fn descriptor_to_posix(descriptor: &SecurityDescriptor) -> Result<PosixOwnership> {
        let owner = descriptor
            .owner()
            .ok_or_else(|| FsError::InvalidSecurityDescriptor {
                reason: "descriptor has no owner".to_string(),
            })?;
        let group = descriptor
            .group()
            .ok_or_else(|| FsError::InvalidSecurityDescriptor {
                reason: "descriptor has no group".to_string(),
            })?;
        let uid = Self::sid_to_uid(owner)?;
        let gid = Self::sid_to_gid(group)?;

        let mode = match descriptor.dacl() {
            None => MODE_PERMISSION_MASK,
            Some(aces) => {
                let everyone = Sid::everyone();
                let owner_bits = effective_bits(aces, &[owner, &everyone]);
                let group_bits = effective_bits(aces, &[group, &everyone]);
                let other_bits = effective_bits(aces, &[&everyone]);
                (owner_bits << 6) | (group_bits << 3) | other_bits
            }
        };
        Ok(PosixOwnership { uid, gid, mode })
    }

    pub fn posix_to_bytes(ownership: PosixOwnership) -> Vec<u8> {
        Self::posix_to_descriptor(ownership).to_bytes()
    }

    pub fn bytes_to_posix(bytes: &[u8]) -> Result<PosixOwnership> {
        Self::descriptor_to_posix(&SecurityDescriptor::from_bytes(bytes)?)
    }
}

/// First-match evaluation of r, w and x for a principal set.
fn effective_bits(aces: &[Ace], principals: &[&Sid]) -> u32 {
    let mut granted = 0;
    let mut decided = 0;
    for ace in aces {
        if !principals.iter().any(|p| **p == ace.sid) {
            continue;
        }
        let bits = rights_to_bits(ace.mask) & !decided;
        if ace.ace_type == AceType::Allow {
            granted |= bits;
        }
        decided |= bits;
        if decided == 0o7 {
            break;
        }
    }
    granted
}
