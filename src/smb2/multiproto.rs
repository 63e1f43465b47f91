//! SMB1 multi-protocol negotiate preamble.
//! MS-CIFS Sections 2.2.3.1 and 2.2.4.52.1, MS-SMB2 Section 3.3.5.3
//!
//! Older clients open a connection with an SMB1 NEGOTIATE listing dialect
//! strings. A client that can speak SMB2 includes "SMB 2.002" and/or
//! "SMB 2.???", and the server answers with an SMB2 NEGOTIATE response.

use super::dialect::{DialectState, Revision};
use super::wire::get_u16;

/// Size of the SMB1 header in bytes.
pub const SMB1_HEADER_SIZE: usize = 32;

/// SMB1 protocol magic: 0xFF 'S' 'M' 'B'
pub const SMB1_MAGIC: [u8; 4] = [0xFF, b'S', b'M', b'B'];

/// SMB_COM_NEGOTIATE
pub const SMB1_COM_NEGOTIATE: u8 = 0x72;

const DIALECT_WILDCARD: &[u8] = b"SMB 2.???";
const DIALECT_SMB2002: &[u8] = b"SMB 2.002";

/// Buffer format byte preceding each dialect string.
const BUFFER_FORMAT_DIALECT: u8 = 0x02;

/// View over an SMB1 request.
#[derive(Debug, Clone, Copy)]
pub struct MultiProtocolRequest<'a> {
    data: &'a [u8],
}

/// SMB2 dialects offered in a multi-protocol negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Smb2Offer {
    pub wildcard: bool,
    pub smb2002: bool,
}

impl Smb2Offer {
    /// State the connection moves to and the revision written into the
    /// SMB2 NEGOTIATE response, or None if nothing usable was offered.
    ///
    /// "SMB 2.???" leaves the connection waiting for an SMB2 NEGOTIATE.
    /// The response names 2.0.2 whenever "SMB 2.002" was offered and the
    /// server allows it, otherwise the wildcard revision.
    pub fn resolve(&self, smb202_enabled: bool) -> Option<(DialectState, Revision)> {
        let smb202 = self.smb2002 && smb202_enabled;
        match (self.wildcard, smb202) {
            (true, true) => Some((DialectState::Wildcard, Revision::Smb202)),
            (true, false) => Some((DialectState::Wildcard, Revision::Wildcard)),
            (false, true) => Some((DialectState::Ready(Revision::Smb202), Revision::Smb202)),
            (false, false) => None,
        }
    }
}

impl<'a> MultiProtocolRequest<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MultiProtocolRequest { data }
    }

    /// At least a full SMB1 header starting with the SMB1 magic.
    pub fn valid(&self) -> bool {
        self.data.len() >= SMB1_HEADER_SIZE && self.data[0..4] == SMB1_MAGIC
    }

    pub fn command(&self) -> u8 {
        self.data[4]
    }

    pub fn is_negotiate(&self) -> bool {
        self.command() == SMB1_COM_NEGOTIATE
    }

    /// SMB2 dialects offered by a well-formed SMB1 NEGOTIATE, or None if the
    /// request is malformed or offers no SMB2 dialect.
    pub fn smb2_offer(&self) -> Option<Smb2Offer> {
        if !self.valid() || !self.is_negotiate() {
            return None;
        }
        let body = &self.data[SMB1_HEADER_SIZE..];
        if body.len() < 3 {
            return None;
        }
        // NEGOTIATE carries no parameter words
        if body[0] != 0 {
            return None;
        }
        let byte_count = get_u16(body, 1) as usize;
        if byte_count < 2 {
            return None;
        }
        let strings = body.get(3..3 + byte_count)?;

        let mut offer = Smb2Offer::default();
        for dialect in dialect_strings(strings)? {
            if dialect == DIALECT_WILDCARD {
                offer.wildcard = true;
            } else if dialect == DIALECT_SMB2002 {
                offer.smb2002 = true;
            }
        }
        (offer.wildcard || offer.smb2002).then_some(offer)
    }
}

/// Split the dialect block into its strings. Every string must start with
/// the dialect buffer format byte; an unterminated trailing string is
/// ignored.
fn dialect_strings(mut data: &[u8]) -> Option<Vec<&[u8]>> {
    let mut out = Vec::new();
    while !data.is_empty() {
        if data[0] != BUFFER_FORMAT_DIALECT {
            return None;
        }
        let rest = &data[1..];
        match rest.iter().position(|&b| b == 0) {
            Some(nul) => {
                out.push(&rest[..nul]);
                data = &rest[nul + 1..];
            }
            None => break,
        }
    }
    Some(out)
}
