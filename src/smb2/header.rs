//! SMB2 Packet Header.
//! MS-SMB2 Section 2.2.1
//!
//! `PacketHeader` is a view over the first 64 bytes of a message. Reading
//! needs `B: AsRef<[u8]>`; the setters used to marshal a response need
//! `B: AsMut<[u8]>` and write straight into the message buffer.

use super::dialect::Revision;
use super::flags::HeaderFlags;
use super::status::NtStatus;
use bytes::BufMut;

use super::wire::{get_u16, get_u32, get_u64};
use super::Smb2Command;

/// Size of the SMB2 header in bytes.
pub const SMB2_HEADER_SIZE: usize = 64;

/// SMB2 protocol magic: 0xFE 'S' 'M' 'B'
pub const SMB2_MAGIC: [u8; 4] = [0xFE, b'S', b'M', b'B'];

/// Bytes 8..12, interpreted by dialect and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    /// SMB 3.x requests: ChannelSequence(2) Reserved(2).
    ChannelSequence(u16),
    /// Responses, and requests in the 2.x dialects.
    Status(NtStatus),
}

/// Bytes 32..40, interpreted by the ASYNC_COMMAND flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderTarget {
    Async(u64),
    Tree(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct PacketHeader<B> {
    buffer: B,
}

impl<B: AsRef<[u8]>> PacketHeader<B> {
    pub fn new(buffer: B) -> Self {
        PacketHeader { buffer }
    }

    /// At least 64 bytes starting with the SMB2 magic. Nothing else is
    /// checked; every accessor below assumes this returned true.
    pub fn valid(&self) -> bool {
        let b = self.buffer.as_ref();
        b.len() >= SMB2_HEADER_SIZE && b[0..4] == SMB2_MAGIC
    }

    fn bytes(&self) -> &[u8] {
        &self.buffer.as_ref()[..SMB2_HEADER_SIZE]
    }

    pub fn protocol_id(&self) -> [u8; 4] {
        let b = self.bytes();
        [b[0], b[1], b[2], b[3]]
    }

    pub fn structure_size(&self) -> u16 {
        get_u16(self.bytes(), 4)
    }

    /// Not meaningful in the SMB 2.0.2 dialect.
    pub fn credit_charge(&self) -> u16 {
        get_u16(self.bytes(), 6)
    }

    /// Raw status word. For SMB 3.x requests use `status_field` instead.
    pub fn status(&self) -> NtStatus {
        NtStatus::from_u32(get_u32(self.bytes(), 8))
    }

    /// Bytes 8..12 interpreted for `dialect`. A response always carries a
    /// status; a request carries a channel sequence from SMB 3.0 onwards.
    pub fn status_field(&self, dialect: Revision) -> StatusField {
        if !self.is_response() && dialect.is_smb3() {
            StatusField::ChannelSequence(get_u16(self.bytes(), 8))
        } else {
            StatusField::Status(self.status())
        }
    }

    pub fn command_code(&self) -> u16 {
        get_u16(self.bytes(), 12)
    }

    pub fn command(&self) -> Option<Smb2Command> {
        Smb2Command::from_u16(self.command_code())
    }

    /// CreditRequest on requests, CreditResponse on responses.
    pub fn credits(&self) -> u16 {
        get_u16(self.bytes(), 14)
    }

    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(get_u32(self.bytes(), 16))
    }

    pub fn is_response(&self) -> bool {
        self.flags().contains(HeaderFlags::SERVER_TO_REDIR)
    }

    /// Offset from the start of this header to the next compounded
    /// message, or zero.
    pub fn next_command(&self) -> u32 {
        get_u32(self.bytes(), 20)
    }

    pub fn message_id(&self) -> u64 {
        get_u64(self.bytes(), 24)
    }

    /// AsyncId when ASYNC_COMMAND is set, otherwise TreeId (bytes 36..40).
    pub fn target(&self) -> HeaderTarget {
        if self.flags().contains(HeaderFlags::ASYNC_COMMAND) {
            HeaderTarget::Async(get_u64(self.bytes(), 32))
        } else {
            HeaderTarget::Tree(get_u32(self.bytes(), 36))
        }
    }

    pub fn session_id(&self) -> u64 {
        get_u64(self.bytes(), 40)
    }

    pub fn signature(&self) -> [u8; 16] {
        let mut sig = [0u8; 16];
        sig.copy_from_slice(&self.bytes()[48..64]);
        sig
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> PacketHeader<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[..SMB2_HEADER_SIZE]
    }

    pub fn set_protocol_id(&mut self) {
        self.bytes_mut()[0..4].copy_from_slice(&SMB2_MAGIC);
    }

    pub fn set_structure_size(&mut self, size: u16) {
        (&mut self.bytes_mut()[4..]).put_u16_le(size);
    }

    pub fn set_credit_charge(&mut self, charge: u16) {
        (&mut self.bytes_mut()[6..]).put_u16_le(charge);
    }

    pub fn set_status(&mut self, status: NtStatus) {
        (&mut self.bytes_mut()[8..]).put_u32_le(status.as_u32());
    }

    pub fn set_command(&mut self, command: Smb2Command) {
        self.set_command_code(command as u16);
    }

    /// Raw command code, for echoing commands this server doesn't know.
    pub fn set_command_code(&mut self, code: u16) {
        (&mut self.bytes_mut()[12..]).put_u16_le(code);
    }

    pub fn set_credits(&mut self, credits: u16) {
        (&mut self.bytes_mut()[14..]).put_u16_le(credits);
    }

    pub fn set_flags(&mut self, flags: HeaderFlags) {
        (&mut self.bytes_mut()[16..]).put_u32_le(flags.bits());
    }

    pub fn set_next_command(&mut self, offset: u32) {
        (&mut self.bytes_mut()[20..]).put_u32_le(offset);
    }

    pub fn set_message_id(&mut self, id: u64) {
        (&mut self.bytes_mut()[24..]).put_u64_le(id);
    }

    /// Writes bytes 32..40. The caller keeps ASYNC_COMMAND in the flags
    /// consistent with the variant.
    pub fn set_target(&mut self, target: HeaderTarget) {
        match target {
            HeaderTarget::Async(id) => (&mut self.bytes_mut()[32..]).put_u64_le(id),
            HeaderTarget::Tree(id) => {
                (&mut self.bytes_mut()[32..]).put_u32_le(0);
                (&mut self.bytes_mut()[36..]).put_u32_le(id);
            }
        }
    }

    pub fn set_session_id(&mut self, id: u64) {
        (&mut self.bytes_mut()[40..]).put_u64_le(id);
    }

    pub fn set_signature(&mut self, signature: &[u8; 16]) {
        self.bytes_mut()[48..64].copy_from_slice(signature);
    }
}
