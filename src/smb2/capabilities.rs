//! Capability payloads of SMB 3.1.1 negotiation contexts.
//! MS-SMB2 Sections 2.2.3.1.1 - 2.2.3.1.3
//!
//! Each view checks that its declared counts fit inside the context data
//! when constructed; the context list itself never looks inside payloads.

use std::fmt;

use super::list::{ListMember, U16List};
use bytes::BufMut;

use super::wire::{get_u16, get_u32};

/// Preauthentication integrity hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha512,
    Other(u16),
}

impl ListMember for HashAlgorithm {
    fn from_u16(v: u16) -> Self {
        match v {
            0x0001 => Self::Sha512,
            v => Self::Other(v),
        }
    }

    fn as_u16(&self) -> u16 {
        match self {
            Self::Sha512 => 0x0001,
            Self::Other(v) => *v,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha512 => write!(f, "SHA-512"),
            Self::Other(v) => write!(f, "Hash-{}", v),
        }
    }
}

/// Encryption cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Aes128Ccm,
    Aes128Gcm,
    Aes256Ccm,
    Aes256Gcm,
    Other(u16),
}

impl ListMember for Cipher {
    fn from_u16(v: u16) -> Self {
        match v {
            0x0001 => Self::Aes128Ccm,
            0x0002 => Self::Aes128Gcm,
            0x0003 => Self::Aes256Ccm,
            0x0004 => Self::Aes256Gcm,
            v => Self::Other(v),
        }
    }

    fn as_u16(&self) -> u16 {
        match self {
            Self::Aes128Ccm => 0x0001,
            Self::Aes128Gcm => 0x0002,
            Self::Aes256Ccm => 0x0003,
            Self::Aes256Gcm => 0x0004,
            Self::Other(v) => *v,
        }
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aes128Ccm => write!(f, "AES-128-CCM"),
            Self::Aes128Gcm => write!(f, "AES-128-GCM"),
            Self::Aes256Ccm => write!(f, "AES-256-CCM"),
            Self::Aes256Gcm => write!(f, "AES-256-GCM"),
            Self::Other(v) => write!(f, "Cipher-{}", v),
        }
    }
}

/// Compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    None,
    Lznt1,
    Lz77,
    Lz77Huffman,
    PatternV1,
    Lz4,
    Other(u16),
}

impl ListMember for CompressionAlgorithm {
    fn from_u16(v: u16) -> Self {
        match v {
            0x0000 => Self::None,
            0x0001 => Self::Lznt1,
            0x0002 => Self::Lz77,
            0x0003 => Self::Lz77Huffman,
            0x0004 => Self::PatternV1,
            0x0005 => Self::Lz4,
            v => Self::Other(v),
        }
    }

    fn as_u16(&self) -> u16 {
        match self {
            Self::None => 0x0000,
            Self::Lznt1 => 0x0001,
            Self::Lz77 => 0x0002,
            Self::Lz77Huffman => 0x0003,
            Self::PatternV1 => 0x0004,
            Self::Lz4 => 0x0005,
            Self::Other(v) => *v,
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Lznt1 => write!(f, "LZNT1"),
            Self::Lz77 => write!(f, "LZ77"),
            Self::Lz77Huffman => write!(f, "LZ77+Huffman"),
            Self::PatternV1 => write!(f, "Pattern_V1"),
            Self::Lz4 => write!(f, "LZ4"),
            Self::Other(v) => write!(f, "Compression-{}", v),
        }
    }
}

pub type HashAlgorithmList<'a> = U16List<'a, HashAlgorithm>;
pub type CipherList<'a> = U16List<'a, Cipher>;
pub type CompressionList<'a> = U16List<'a, CompressionAlgorithm>;

/// SMB2_PREAUTH_INTEGRITY_CAPABILITIES:
/// HashAlgorithmCount(2) SaltLength(2) HashAlgorithms(2*n) Salt.
#[derive(Debug, Clone, Copy)]
pub struct PreauthIntegrityCaps<'a> {
    algorithms: HashAlgorithmList<'a>,
    salt: &'a [u8],
}

impl<'a> PreauthIntegrityCaps<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        let count = get_u16(data, 0) as usize;
        let salt_len = get_u16(data, 2) as usize;
        let algorithms = HashAlgorithmList::with_count(&data[4..], count)?;
        let salt_start = 4 + count * 2;
        let salt = data.get(salt_start..salt_start + salt_len)?;
        Some(PreauthIntegrityCaps { algorithms, salt })
    }

    pub fn algorithms(&self) -> HashAlgorithmList<'a> {
        self.algorithms
    }

    pub fn salt(&self) -> &'a [u8] {
        self.salt
    }

    pub fn size(algorithms: &[HashAlgorithm], salt: &[u8]) -> usize {
        4 + HashAlgorithmList::size_of(algorithms.len()) + salt.len()
    }

    pub fn write(buf: &mut [u8], algorithms: &[HashAlgorithm], salt: &[u8]) {
        let mut counts = &mut buf[..4];
        counts.put_u16_le(algorithms.len() as u16);
        counts.put_u16_le(salt.len() as u16);
        HashAlgorithmList::write(&mut buf[4..], algorithms);
        let salt_start = 4 + algorithms.len() * 2;
        buf[salt_start..salt_start + salt.len()].copy_from_slice(salt);
    }
}

/// SMB2_ENCRYPTION_CAPABILITIES: CipherCount(2) Ciphers(2*n).
#[derive(Debug, Clone, Copy)]
pub struct EncryptionCaps<'a> {
    ciphers: CipherList<'a>,
}

impl<'a> EncryptionCaps<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }
        let count = get_u16(data, 0) as usize;
        let ciphers = CipherList::with_count(&data[2..], count)?;
        Some(EncryptionCaps { ciphers })
    }

    pub fn ciphers(&self) -> CipherList<'a> {
        self.ciphers
    }

    pub fn size(ciphers: &[Cipher]) -> usize {
        2 + CipherList::size_of(ciphers.len())
    }

    pub fn write(buf: &mut [u8], ciphers: &[Cipher]) {
        (&mut buf[..2]).put_u16_le(ciphers.len() as u16);
        CipherList::write(&mut buf[2..], ciphers);
    }
}

/// SMB2_COMPRESSION_CAPABILITIES:
/// CompressionAlgorithmCount(2) Padding(2) Flags(4) CompressionAlgorithms(2*n).
#[derive(Debug, Clone, Copy)]
pub struct CompressionCaps<'a> {
    flags: u32,
    algorithms: CompressionList<'a>,
}

impl<'a> CompressionCaps<'a> {
    /// SMB2_COMPRESSION_CAPABILITIES_FLAG_CHAINED
    pub const FLAG_CHAINED: u32 = 0x0000_0001;

    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }
        let count = get_u16(data, 0) as usize;
        let flags = get_u32(data, 4);
        let algorithms = CompressionList::with_count(&data[8..], count)?;
        Some(CompressionCaps { flags, algorithms })
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn algorithms(&self) -> CompressionList<'a> {
        self.algorithms
    }

    pub fn size(algorithms: &[CompressionAlgorithm]) -> usize {
        8 + CompressionList::size_of(algorithms.len())
    }

    pub fn write(buf: &mut [u8], flags: u32, algorithms: &[CompressionAlgorithm]) {
        let mut fixed = &mut buf[..8];
        fixed.put_u16_le(algorithms.len() as u16);
        fixed.put_u16_le(0); // Padding
        fixed.put_u32_le(flags);
        CompressionList::write(&mut buf[8..], algorithms);
    }
}
