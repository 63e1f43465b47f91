//! SMB 3.1.1 negotiation contexts.
//! MS-SMB2 Section 2.2.3.1
//!
//! A context is ContextType(2) DataLength(2) Reserved(4) followed by
//! DataLength bytes of type-specific payload. Contexts in a list are laid
//! back to back; every context after the first starts on an 8-byte boundary.

use std::fmt;

use super::capabilities::{
    Cipher, CompressionAlgorithm, CompressionCaps, EncryptionCaps, HashAlgorithm,
    PreauthIntegrityCaps,
};
use bytes::BufMut;

use super::wire::{self, align8, get_u16};

/// Bytes in a context header.
pub const CONTEXT_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    PreauthIntegrity,
    Encryption,
    Compression,
    NetName,
    TransportCapabilities,
    RdmaTransform,
    Signing,
    Other(u16),
}

impl ContextType {
    pub fn as_u16(&self) -> u16 {
        match self {
            Self::PreauthIntegrity => 0x0001,
            Self::Encryption => 0x0002,
            Self::Compression => 0x0003,
            Self::NetName => 0x0005,
            Self::TransportCapabilities => 0x0006,
            Self::RdmaTransform => 0x0007,
            Self::Signing => 0x0008,
            Self::Other(v) => *v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            0x0001 => Self::PreauthIntegrity,
            0x0002 => Self::Encryption,
            0x0003 => Self::Compression,
            0x0005 => Self::NetName,
            0x0006 => Self::TransportCapabilities,
            0x0007 => Self::RdmaTransform,
            0x0008 => Self::Signing,
            v => Self::Other(v),
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(v) => write!(f, "ContextType-{}", v),
            known => write!(f, "{:?}", known),
        }
    }
}

/// View of a single negotiation context.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    bytes: &'a [u8],
}

impl<'a> Context<'a> {
    /// `bytes` must hold the header and the full payload.
    fn new(bytes: &'a [u8]) -> Self {
        Context { bytes }
    }

    pub fn context_type(&self) -> ContextType {
        ContextType::from_u16(get_u16(self.bytes, 0))
    }

    pub fn data_length(&self) -> u16 {
        get_u16(self.bytes, 2)
    }

    pub fn data(&self) -> &'a [u8] {
        &self.bytes[CONTEXT_HEADER_SIZE..CONTEXT_HEADER_SIZE + self.data_length() as usize]
    }

    pub fn preauth_integrity(&self) -> Option<PreauthIntegrityCaps<'a>> {
        self.typed(ContextType::PreauthIntegrity)
            .and_then(PreauthIntegrityCaps::new)
    }

    pub fn encryption(&self) -> Option<EncryptionCaps<'a>> {
        self.typed(ContextType::Encryption).and_then(EncryptionCaps::new)
    }

    pub fn compression(&self) -> Option<CompressionCaps<'a>> {
        self.typed(ContextType::Compression).and_then(CompressionCaps::new)
    }

    /// Server name the client is connecting to.
    pub fn net_name(&self) -> Option<String> {
        self.typed(ContextType::NetName).map(wire::utf16le_to_string)
    }

    fn typed(&self, ty: ContextType) -> Option<&'a [u8]> {
        (self.context_type() == ty).then(|| self.data())
    }
}

/// View of a negotiation context list.
#[derive(Debug, Clone, Copy)]
pub struct ContextList<'a> {
    bytes: &'a [u8],
}

impl<'a> ContextList<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ContextList { bytes }
    }

    /// True if `count` contexts, each with its header and declared payload,
    /// fit inside the list. Payloads are not inspected.
    pub fn valid(&self, count: u16) -> bool {
        let len = self.bytes.len();
        let mut offset = 0usize;
        for i in 0..count {
            if i > 0 {
                offset = align8(offset);
            }
            let data_start = offset + CONTEXT_HEADER_SIZE;
            if data_start > len {
                return false;
            }
            let length = get_u16(self.bytes, offset + 2) as usize;
            let end = data_start + length;
            if end > len {
                return false;
            }
            offset = end;
        }
        true
    }

    /// Iterate the first `count` contexts. Iteration stops early at a
    /// context that does not fit.
    pub fn iter(&self, count: u16) -> ContextIter<'a> {
        ContextIter { bytes: self.bytes, offset: 0, remaining: count, first: true }
    }

    /// First context of the given type among the first `count`.
    pub fn find(&self, count: u16, ty: ContextType) -> Option<Context<'a>> {
        self.iter(count).find(|c| c.context_type() == ty)
    }
}

pub struct ContextIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    remaining: u16,
    first: bool,
}

impl<'a> Iterator for ContextIter<'a> {
    type Item = Context<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let start = if self.first { self.offset } else { align8(self.offset) };
        let header = self.bytes.get(start..start + CONTEXT_HEADER_SIZE)?;
        let end = start + CONTEXT_HEADER_SIZE + get_u16(header, 2) as usize;
        let bytes = self.bytes.get(start..end)?;
        self.first = false;
        self.offset = end;
        self.remaining -= 1;
        Some(Context::new(bytes))
    }
}

/// An owned negotiation context to be marshaled into a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiateContext {
    PreauthIntegrity { algorithms: Vec<HashAlgorithm>, salt: Vec<u8> },
    Encryption { ciphers: Vec<Cipher> },
    Compression { flags: u32, algorithms: Vec<CompressionAlgorithm> },
    NetName(String),
}

impl NegotiateContext {
    pub fn context_type(&self) -> ContextType {
        match self {
            Self::PreauthIntegrity { .. } => ContextType::PreauthIntegrity,
            Self::Encryption { .. } => ContextType::Encryption,
            Self::Compression { .. } => ContextType::Compression,
            Self::NetName(_) => ContextType::NetName,
        }
    }

    pub fn data_length(&self) -> usize {
        match self {
            Self::PreauthIntegrity { algorithms, salt } => PreauthIntegrityCaps::size(algorithms, salt),
            Self::Encryption { ciphers } => EncryptionCaps::size(ciphers),
            Self::Compression { algorithms, .. } => CompressionCaps::size(algorithms),
            Self::NetName(name) => name.encode_utf16().count() * 2,
        }
    }

    /// Header plus payload, without trailing padding.
    pub fn size(&self) -> usize {
        CONTEXT_HEADER_SIZE + self.data_length()
    }

    /// Write header and payload at the start of `buf`.
    pub fn write(&self, buf: &mut [u8]) {
        let mut hdr = &mut buf[..CONTEXT_HEADER_SIZE];
        hdr.put_u16_le(self.context_type().as_u16());
        hdr.put_u16_le(self.data_length() as u16);
        hdr.put_u32_le(0); // Reserved
        let data = &mut buf[CONTEXT_HEADER_SIZE..];
        match self {
            Self::PreauthIntegrity { algorithms, salt } => {
                PreauthIntegrityCaps::write(data, algorithms, salt)
            }
            Self::Encryption { ciphers } => EncryptionCaps::write(data, ciphers),
            Self::Compression { flags, algorithms } => CompressionCaps::write(data, *flags, algorithms),
            Self::NetName(name) => {
                let encoded = wire::string_to_utf16le(name);
                data[..encoded.len()].copy_from_slice(&encoded);
            }
        }
    }
}

/// Bytes needed for `contexts` laid out as a list, 8-byte aligned between
/// members and unpadded after the last one.
pub fn list_size(contexts: &[NegotiateContext]) -> usize {
    let mut offset = 0;
    for (i, ctx) in contexts.iter().enumerate() {
        if i > 0 {
            offset = align8(offset);
        }
        offset += ctx.size();
    }
    offset
}

/// Write `contexts` as a list at the start of `buf`. Padding bytes are zeroed.
pub fn write_list(buf: &mut [u8], contexts: &[NegotiateContext]) {
    let mut offset = 0;
    for (i, ctx) in contexts.iter().enumerate() {
        if i > 0 {
            let aligned = align8(offset);
            buf[offset..aligned].fill(0);
            offset = aligned;
        }
        ctx.write(&mut buf[offset..]);
        offset += ctx.size();
    }
}
