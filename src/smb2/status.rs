//! NT_STATUS codes carried in the SMB2 header status field.
//! Reference: [MS-ERREF] Section 2.3

use std::fmt;

/// NT Status codes this server reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtStatus {
    Success,
    Pending,
    InvalidParameter,
    NotSupported,
    Other(u32),
}

impl NtStatus {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Success => 0x0000_0000,
            Self::Pending => 0x0000_0103,
            Self::InvalidParameter => 0xC000_000D,
            Self::NotSupported => 0xC000_00BB,
            Self::Other(v) => *v,
        }
    }

    pub fn from_u32(v: u32) -> Self {
        match v {
            0x0000_0000 => Self::Success,
            0x0000_0103 => Self::Pending,
            0xC000_000D => Self::InvalidParameter,
            0xC000_00BB => Self::NotSupported,
            v => Self::Other(v),
        }
    }

    pub fn is_error(&self) -> bool {
        (self.as_u32() >> 30) == 3
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(v) => write!(f, "0x{:08x}", v),
            known => write!(f, "{:?}", known),
        }
    }
}
