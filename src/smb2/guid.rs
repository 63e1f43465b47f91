//! GUID wire encoding.
//! MS-DTYP Section 2.3.4.2
//!
//! On the wire a GUID is Data1 (u32), Data2 (u16) and Data3 (u16) in
//! little-endian order followed by the eight Data4 bytes as-is.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// A 16-byte client or server identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid(Uuid);

impl Guid {
    pub const SIZE: usize = 16;

    pub const ZERO: Guid = Guid(Uuid::nil());

    /// Generate a random (version 4) GUID.
    pub fn new_random() -> Self {
        Guid(Uuid::new_v4())
    }

    /// Read a GUID from the first 16 bytes of `b`.
    pub fn read(b: &[u8]) -> Self {
        let mut raw = [0u8; Self::SIZE];
        raw.copy_from_slice(&b[..Self::SIZE]);
        Guid(Uuid::from_bytes_le(raw))
    }

    /// Write the GUID into the first 16 bytes of `b`.
    pub fn write(&self, b: &mut [u8]) {
        b[..Self::SIZE].copy_from_slice(&self.0.to_bytes_le());
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Guid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Guid)
    }
}
