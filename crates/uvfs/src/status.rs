//! NT status codes carried in every response.
//!
//! The core only ever emits the codes listed here. Codes produced by a
//! backing store that are not known to the enum survive as
//! [`NtStatus::Other`] so they reach the transport unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-bit NT status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum NtStatus {
    /// The operation completed.
    Success,
    /// The operation will complete asynchronously.
    Pending,
    /// The name contains a reparse point; resolution must restart.
    Reparse,
    /// The output was truncated to fit the caller's buffer.
    BufferOverflow,
    /// Directory enumeration has no further entries.
    NoMoreFiles,
    /// Generic failure.
    Unsuccessful,
    /// The backing store does not provide this capability.
    NotImplemented,
    /// The request named a file context that is not open.
    InvalidHandle,
    /// Malformed request.
    InvalidParameter,
    /// The request kind or control code is not recognized.
    InvalidDeviceRequest,
    /// Read past the end of a file.
    EndOfFile,
    /// Access denied by the backing store.
    AccessDenied,
    /// The name is syntactically invalid.
    ObjectNameInvalid,
    /// The final path component does not exist.
    ObjectNameNotFound,
    /// The name already exists.
    ObjectNameCollision,
    /// An intermediate path component does not exist.
    ObjectPathNotFound,
    /// The identity cannot be mapped to an owner.
    InvalidOwner,
    /// The security descriptor is malformed.
    InvalidSecurityDescriptor,
    /// The volume is out of space.
    DiskFull,
    /// Too many requests are in flight.
    InsufficientResources,
    /// The volume is read-only.
    MediaWriteProtected,
    /// The request expected a file but found a directory.
    FileIsADirectory,
    /// The handler failed unexpectedly.
    InternalError,
    /// The directory still has entries.
    DirectoryNotEmpty,
    /// The request expected a directory but found a file.
    NotADirectory,
    /// The request was cancelled before dispatch.
    Cancelled,
    /// The file is not a reparse point.
    NotAReparsePoint,
    /// The reparse tag is not one the resolver substitutes.
    ReparseTagNotHandled,
    /// Reparse resolution exceeded the loop bound.
    ReparsePointNotResolved,
    /// Any other status, passed through verbatim.
    Other(u32),
}

impl NtStatus {
    /// The 32-bit wire value.
    pub fn raw(self) -> u32 {
        match self {
            NtStatus::Success => 0x0000_0000,
            NtStatus::Pending => 0x0000_0103,
            NtStatus::Reparse => 0x0000_0104,
            NtStatus::BufferOverflow => 0x8000_0005,
            NtStatus::NoMoreFiles => 0x8000_0006,
            NtStatus::Unsuccessful => 0xC000_0001,
            NtStatus::NotImplemented => 0xC000_0002,
            NtStatus::InvalidHandle => 0xC000_0008,
            NtStatus::InvalidParameter => 0xC000_000D,
            NtStatus::InvalidDeviceRequest => 0xC000_0010,
            NtStatus::EndOfFile => 0xC000_0011,
            NtStatus::AccessDenied => 0xC000_0022,
            NtStatus::ObjectNameInvalid => 0xC000_0033,
            NtStatus::ObjectNameNotFound => 0xC000_0034,
            NtStatus::ObjectNameCollision => 0xC000_0035,
            NtStatus::ObjectPathNotFound => 0xC000_003A,
            NtStatus::InvalidOwner => 0xC000_005A,
            NtStatus::InvalidSecurityDescriptor => 0xC000_0079,
            NtStatus::DiskFull => 0xC000_007F,
            NtStatus::InsufficientResources => 0xC000_009A,
            NtStatus::MediaWriteProtected => 0xC000_00A2,
            NtStatus::FileIsADirectory => 0xC000_00BA,
            NtStatus::InternalError => 0xC000_00E5,
            NtStatus::DirectoryNotEmpty => 0xC000_0101,
            NtStatus::NotADirectory => 0xC000_0103,
            NtStatus::Cancelled => 0xC000_0120,
            NtStatus::NotAReparsePoint => 0xC000_0275,
            NtStatus::ReparseTagNotHandled => 0xC000_0279,
            NtStatus::ReparsePointNotResolved => 0xC000_0280,
            NtStatus::Other(raw) => raw,
        }
    }

    /// Decode a wire value. Unknown codes become [`NtStatus::Other`].
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x0000_0000 => NtStatus::Success,
            0x0000_0103 => NtStatus::Pending,
            0x0000_0104 => NtStatus::Reparse,
            0x8000_0005 => NtStatus::BufferOverflow,
            0x8000_0006 => NtStatus::NoMoreFiles,
            0xC000_0001 => NtStatus::Unsuccessful,
            0xC000_0002 => NtStatus::NotImplemented,
            0xC000_0008 => NtStatus::InvalidHandle,
            0xC000_000D => NtStatus::InvalidParameter,
            0xC000_0010 => NtStatus::InvalidDeviceRequest,
            0xC000_0011 => NtStatus::EndOfFile,
            0xC000_0022 => NtStatus::AccessDenied,
            0xC000_0033 => NtStatus::ObjectNameInvalid,
            0xC000_0034 => NtStatus::ObjectNameNotFound,
            0xC000_0035 => NtStatus::ObjectNameCollision,
            0xC000_003A => NtStatus::ObjectPathNotFound,
            0xC000_005A => NtStatus::InvalidOwner,
            0xC000_0079 => NtStatus::InvalidSecurityDescriptor,
            0xC000_007F => NtStatus::DiskFull,
            0xC000_009A => NtStatus::InsufficientResources,
            0xC000_00A2 => NtStatus::MediaWriteProtected,
            0xC000_00BA => NtStatus::FileIsADirectory,
            0xC000_00E5 => NtStatus::InternalError,
            0xC000_0101 => NtStatus::DirectoryNotEmpty,
            0xC000_0103 => NtStatus::NotADirectory,
            0xC000_0120 => NtStatus::Cancelled,
            0xC000_0275 => NtStatus::NotAReparsePoint,
            0xC000_0279 => NtStatus::ReparseTagNotHandled,
            0xC000_0280 => NtStatus::ReparsePointNotResolved,
            other => NtStatus::Other(other),
        }
    }

    /// Success and informational codes (severity bits `00`).
    pub fn is_success(self) -> bool {
        self.raw() >> 30 == 0
    }

    /// Warning codes such as a truncated buffer (severity bits `10`).
    pub fn is_warning(self) -> bool {
        self.raw() >> 30 == 0b10
    }

    /// Error codes (severity bits `11`).
    pub fn is_error(self) -> bool {
        self.raw() >> 30 == 0b11
    }
}

impl From<u32> for NtStatus {
    fn from(raw: u32) -> Self {
        NtStatus::from_raw(raw)
    }
}

impl From<NtStatus> for u32 {
    fn from(status: NtStatus) -> Self {
        status.raw()
    }
}

impl Default for NtStatus {
    fn default() -> Self {
        NtStatus::Success
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtStatus::Other(raw) => write!(f, "STATUS_0x{:08X}", raw),
            known => write!(f, "{:?} (0x{:08X})", known, known.raw()),
        }
    }
}
