//! SMB2 NEGOTIATE command.
//! MS-SMB2 Section 2.2.3 (Request) and 2.2.4 (Response)
//!
//! Both views cover the message body, i.e. the bytes after the 64-byte
//! header. Offsets on the wire are relative to the start of the header, so
//! they are rebased by `SMB2_HEADER_SIZE` before use.

use std::time::SystemTime;

use super::capabilities::{Cipher, HashAlgorithm};
use super::context::{self, Context, ContextList, ContextType, NegotiateContext, CONTEXT_HEADER_SIZE};
use super::dialect::{DialectList, Revision};
use super::filetime::{get_time, put_time};
use super::flags::{Capabilities, SecurityMode};
use super::guid::Guid;
use super::header::SMB2_HEADER_SIZE;
use bytes::BufMut;

use super::wire::{align8, get_u16, get_u32};
use crate::error::ServerError;

/// StructureSize of a NEGOTIATE request; also its fixed part in bytes.
pub const NEGOTIATE_REQUEST_SIZE: usize = 36;

/// StructureSize of a NEGOTIATE response.
pub const NEGOTIATE_RESPONSE_STRUCTURE_SIZE: u16 = 65;

/// Fixed part of a NEGOTIATE response body.
pub const NEGOTIATE_RESPONSE_FIXED_SIZE: usize = 64;

/// Largest security buffer the 16-bit length field can describe.
pub const MAX_SECURITY_BUFFER: usize = u16::MAX as usize;

/// Rebase a header-relative offset onto the body.
fn body_offset(offset: u32) -> Option<usize> {
    (offset as usize).checked_sub(SMB2_HEADER_SIZE)
}

/// View over a NEGOTIATE request body.
#[derive(Debug, Clone, Copy)]
pub struct NegotiateRequest<'a> {
    body: &'a [u8],
}

impl<'a> NegotiateRequest<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        NegotiateRequest { body }
    }

    /// Structural validation. Accessors assume this returned true.
    ///
    /// The context region is only checked when 3.1.1 is among the offered
    /// dialects, whichever dialect is eventually selected.
    pub fn valid(&self) -> bool {
        let len = self.body.len();
        if len < NEGOTIATE_REQUEST_SIZE {
            return false;
        }
        if self.structure_size() as usize != NEGOTIATE_REQUEST_SIZE {
            return false;
        }
        let count = self.dialect_count() as usize;
        if count == 0 {
            return false;
        }
        if !SecurityMode::is_recognized(self.security_mode_raw()) {
            return false;
        }
        if NEGOTIATE_REQUEST_SIZE + count * 2 > len {
            return false;
        }
        if self.dialects().contains(Revision::Smb311) {
            // Offsets count from the header, so the region must end inside
            // header plus body even when no context is declared
            let contexts = self.context_count();
            let region_end = self.context_offset() as usize + contexts as usize * CONTEXT_HEADER_SIZE;
            if region_end > SMB2_HEADER_SIZE + len {
                return false;
            }
            if contexts > 0 {
                let start = match body_offset(self.context_offset()) {
                    Some(start) => start,
                    None => return false,
                };
                if !ContextList::new(&self.body[start..]).valid(contexts) {
                    return false;
                }
            }
        }
        true
    }

    pub fn structure_size(&self) -> u16 {
        get_u16(self.body, 0)
    }

    pub fn dialect_count(&self) -> u16 {
        get_u16(self.body, 2)
    }

    pub fn security_mode_raw(&self) -> u16 {
        get_u16(self.body, 4)
    }

    pub fn security_mode(&self) -> SecurityMode {
        SecurityMode::from_bits_retain(self.security_mode_raw())
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_bits_retain(get_u32(self.body, 8))
    }

    pub fn client_guid(&self) -> Guid {
        Guid::read(&self.body[12..28])
    }

    /// Bytes 28..36 when 3.1.1 is not offered. Clients send zero.
    pub fn client_start_time(&self) -> Option<SystemTime> {
        get_time(self.body, 28)
    }

    /// Header-relative offset of the first context. 3.1.1 only.
    pub fn context_offset(&self) -> u32 {
        get_u32(self.body, 28)
    }

    /// 3.1.1 only.
    pub fn context_count(&self) -> u16 {
        get_u16(self.body, 32)
    }

    pub fn dialects(&self) -> DialectList<'a> {
        let end = NEGOTIATE_REQUEST_SIZE + self.dialect_count() as usize * 2;
        DialectList::new(&self.body[NEGOTIATE_REQUEST_SIZE..end])
    }

    /// Context list, or an empty list when the offset points outside the body.
    pub fn contexts(&self) -> ContextList<'a> {
        let bytes = body_offset(self.context_offset())
            .and_then(|start| self.body.get(start..))
            .unwrap_or(&[]);
        ContextList::new(bytes)
    }

    pub fn find_context(&self, ty: ContextType) -> Option<Context<'a>> {
        if !self.dialects().contains(Revision::Smb311) {
            return None;
        }
        self.contexts().find(self.context_count(), ty)
    }

    /// True if a preauth integrity context offers SHA-512.
    pub fn offers_sha512(&self) -> bool {
        self.find_context(ContextType::PreauthIntegrity)
            .and_then(|c| c.preauth_integrity())
            .map_or(false, |caps| caps.algorithms().contains(HashAlgorithm::Sha512))
    }

    /// Highest revision offered by the client and enabled on the server.
    /// 3.1.1 additionally needs a SHA-512 preauth integrity offer.
    pub fn select_dialect(&self, enabled: &[Revision]) -> Option<Revision> {
        let offered = self.dialects();
        Revision::CONCRETE
            .iter()
            .rev()
            .copied()
            .filter(|r| enabled.contains(r) && offered.contains(*r))
            .find(|r| *r != Revision::Smb311 || self.offers_sha512())
    }

    /// First cipher in `preferred` that the client's encryption context offers.
    pub fn select_cipher(&self, preferred: &[Cipher]) -> Option<Cipher> {
        let caps = self.find_context(ContextType::Encryption)?.encryption()?;
        let offered = caps.ciphers();
        preferred.iter().copied().find(|c| offered.contains(*c))
    }
}

/// NEGOTIATE response to marshal and send.
#[derive(Debug, Clone)]
pub struct NegotiateResponse {
    pub security_mode: SecurityMode,
    pub dialect: Revision,
    pub server_guid: Guid,
    pub capabilities: Capabilities,
    pub max_transact_size: u32,
    pub max_read_size: u32,
    pub max_write_size: u32,
    pub system_time: Option<SystemTime>,
    pub server_start_time: Option<SystemTime>,
    pub security_buffer: Vec<u8>,
    /// Only written when the dialect is 3.1.1.
    pub contexts: Vec<NegotiateContext>,
}

impl NegotiateResponse {
    fn has_contexts(&self) -> bool {
        self.dialect == Revision::Smb311 && !self.contexts.is_empty()
    }

    /// Body offset of the context list: the first 8-byte boundary after the
    /// security buffer, measured from the header.
    fn context_start(&self) -> usize {
        let end = SMB2_HEADER_SIZE + NEGOTIATE_RESPONSE_FIXED_SIZE + self.security_buffer.len();
        align8(end) - SMB2_HEADER_SIZE
    }

    /// Body size needed by `marshal`.
    pub fn size(&self) -> usize {
        if self.has_contexts() {
            self.context_start() + context::list_size(&self.contexts)
        } else {
            NEGOTIATE_RESPONSE_FIXED_SIZE + self.security_buffer.len()
        }
    }

    /// Write the response body into `body`. Returns the number of bytes
    /// written. Fails without writing if the security buffer is too large
    /// or `body` cannot hold the whole response.
    pub fn marshal(&self, body: &mut [u8]) -> Result<usize, ServerError> {
        let sec_len = self.security_buffer.len();
        if sec_len > MAX_SECURITY_BUFFER {
            return Err(ServerError::SecurityBufferTooLarge(sec_len));
        }
        let needed = self.size();
        if body.len() < needed {
            return Err(ServerError::BufferTooSmall { needed, available: body.len() });
        }

        let body = &mut body[..needed];
        let mut view = NegotiateResponseView::new(&mut *body);
        view.set_structure_size(NEGOTIATE_RESPONSE_STRUCTURE_SIZE);
        view.set_security_mode(self.security_mode | SecurityMode::SIGNING_ENABLED);
        view.set_dialect_revision(self.dialect);
        view.set_server_guid(&self.server_guid);
        view.set_capabilities(self.capabilities);
        view.set_max_transact_size(self.max_transact_size);
        view.set_max_read_size(self.max_read_size);
        view.set_max_write_size(self.max_write_size);
        view.set_system_time(self.system_time);
        view.set_server_start_time(self.server_start_time);
        view.set_security_buffer_offset((SMB2_HEADER_SIZE + NEGOTIATE_RESPONSE_FIXED_SIZE) as u16);
        view.set_security_buffer_length(sec_len as u16);
        if self.has_contexts() {
            let start = self.context_start();
            view.set_context_count(self.contexts.len() as u16);
            view.set_context_offset((SMB2_HEADER_SIZE + start) as u32);
        } else {
            view.set_context_count(0);
            view.set_context_offset(0);
        }

        let sec_start = NEGOTIATE_RESPONSE_FIXED_SIZE;
        body[sec_start..sec_start + sec_len].copy_from_slice(&self.security_buffer);
        if self.has_contexts() {
            let start = self.context_start();
            body[sec_start + sec_len..start].fill(0);
            context::write_list(&mut body[start..], &self.contexts);
        }
        Ok(needed)
    }
}

/// View over a NEGOTIATE response body. Used to read back marshaled
/// responses; the setters back `NegotiateResponse::marshal`.
#[derive(Debug, Clone, Copy)]
pub struct NegotiateResponseView<B> {
    body: B,
}

impl<B: AsRef<[u8]>> NegotiateResponseView<B> {
    pub fn new(body: B) -> Self {
        NegotiateResponseView { body }
    }

    fn bytes(&self) -> &[u8] {
        self.body.as_ref()
    }

    /// Structural validation. Accessors assume this returned true.
    pub fn valid(&self) -> bool {
        let len = self.bytes().len();
        if len < NEGOTIATE_RESPONSE_FIXED_SIZE {
            return false;
        }
        if self.structure_size() != NEGOTIATE_RESPONSE_STRUCTURE_SIZE {
            return false;
        }
        if self.security_buffer_length() > 0 && self.security_buffer_range().is_none() {
            return false;
        }
        if self.dialect_revision() == Revision::Smb311 {
            let count = self.context_count();
            if count > 0 {
                let start = match body_offset(self.context_offset()) {
                    Some(start) => start,
                    None => return false,
                };
                if start + count as usize * CONTEXT_HEADER_SIZE > len {
                    return false;
                }
                if !ContextList::new(&self.bytes()[start..]).valid(count) {
                    return false;
                }
            }
        }
        true
    }

    pub fn structure_size(&self) -> u16 {
        get_u16(self.bytes(), 0)
    }

    pub fn security_mode(&self) -> SecurityMode {
        SecurityMode::from_bits_retain(get_u16(self.bytes(), 2))
    }

    pub fn dialect_revision(&self) -> Revision {
        Revision::from_u16(get_u16(self.bytes(), 4))
    }

    /// 3.1.1 only.
    pub fn context_count(&self) -> u16 {
        get_u16(self.bytes(), 6)
    }

    pub fn server_guid(&self) -> Guid {
        Guid::read(&self.bytes()[8..24])
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_bits_retain(get_u32(self.bytes(), 24))
    }

    pub fn max_transact_size(&self) -> u32 {
        get_u32(self.bytes(), 28)
    }

    pub fn max_read_size(&self) -> u32 {
        get_u32(self.bytes(), 32)
    }

    pub fn max_write_size(&self) -> u32 {
        get_u32(self.bytes(), 36)
    }

    pub fn system_time(&self) -> Option<SystemTime> {
        get_time(self.bytes(), 40)
    }

    pub fn server_start_time(&self) -> Option<SystemTime> {
        get_time(self.bytes(), 48)
    }

    /// Header-relative.
    pub fn security_buffer_offset(&self) -> u16 {
        get_u16(self.bytes(), 56)
    }

    pub fn security_buffer_length(&self) -> u16 {
        get_u16(self.bytes(), 58)
    }

    fn security_buffer_range(&self) -> Option<std::ops::Range<usize>> {
        let start = body_offset(self.security_buffer_offset() as u32)?;
        let end = start + self.security_buffer_length() as usize;
        (end <= self.bytes().len()).then_some(start..end)
    }

    pub fn security_buffer(&self) -> &[u8] {
        match self.security_buffer_range() {
            Some(range) => &self.bytes()[range],
            None => &[],
        }
    }

    /// Header-relative offset of the first context. 3.1.1 only.
    pub fn context_offset(&self) -> u32 {
        get_u32(self.bytes(), 60)
    }

    pub fn contexts(&self) -> ContextList<'_> {
        let bytes = body_offset(self.context_offset())
            .and_then(|start| self.bytes().get(start..))
            .unwrap_or(&[]);
        ContextList::new(bytes)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> NegotiateResponseView<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.body.as_mut()
    }

    pub fn set_structure_size(&mut self, size: u16) {
        (&mut self.bytes_mut()[0..]).put_u16_le(size);
    }

    pub fn set_security_mode(&mut self, mode: SecurityMode) {
        (&mut self.bytes_mut()[2..]).put_u16_le(mode.bits());
    }

    pub fn set_dialect_revision(&mut self, revision: Revision) {
        (&mut self.bytes_mut()[4..]).put_u16_le(revision.as_u16());
    }

    pub fn set_context_count(&mut self, count: u16) {
        (&mut self.bytes_mut()[6..]).put_u16_le(count);
    }

    pub fn set_server_guid(&mut self, guid: &Guid) {
        guid.write(&mut self.bytes_mut()[8..24]);
    }

    pub fn set_capabilities(&mut self, caps: Capabilities) {
        (&mut self.bytes_mut()[24..]).put_u32_le(caps.bits());
    }

    pub fn set_max_transact_size(&mut self, size: u32) {
        (&mut self.bytes_mut()[28..]).put_u32_le(size);
    }

    pub fn set_max_read_size(&mut self, size: u32) {
        (&mut self.bytes_mut()[32..]).put_u32_le(size);
    }

    pub fn set_max_write_size(&mut self, size: u32) {
        (&mut self.bytes_mut()[36..]).put_u32_le(size);
    }

    pub fn set_system_time(&mut self, t: Option<SystemTime>) {
        put_time(self.bytes_mut(), 40, t);
    }

    pub fn set_server_start_time(&mut self, t: Option<SystemTime>) {
        put_time(self.bytes_mut(), 48, t);
    }

    pub fn set_security_buffer_offset(&mut self, offset: u16) {
        (&mut self.bytes_mut()[56..]).put_u16_le(offset);
    }

    pub fn set_security_buffer_length(&mut self, length: u16) {
        (&mut self.bytes_mut()[58..]).put_u16_le(length);
    }

    pub fn set_context_offset(&mut self, offset: u32) {
        (&mut self.bytes_mut()[60..]).put_u32_le(offset);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::smb2::list::ListMember;
    use std::time::{Duration, UNIX_EPOCH};

    /// Build a NEGOTIATE request body. Contexts are placed right after the
    /// dialect list, 8-byte aligned relative to the header.
    pub(crate) fn build_request(
        security_mode: u16,
        dialects: &[Revision],
        contexts: &[NegotiateContext],
    ) -> Vec<u8> {
        let dialects_end = NEGOTIATE_REQUEST_SIZE + dialects.len() * 2;
        let mut body = vec![0u8; dialects_end];
        let mut fixed = &mut body[..12];
        fixed.put_u16_le(NEGOTIATE_REQUEST_SIZE as u16);
        fixed.put_u16_le(dialects.len() as u16);
        fixed.put_u16_le(security_mode);
        fixed.put_u16_le(0); // Reserved
        fixed.put_u32_le(Capabilities::LARGE_MTU.bits());
        Guid::new_random().write(&mut body[12..28]);
        DialectList::write(&mut body[NEGOTIATE_REQUEST_SIZE..], dialects);
        if !contexts.is_empty() {
            let start = align8(SMB2_HEADER_SIZE + dialects_end) - SMB2_HEADER_SIZE;
            (&mut body[28..]).put_u32_le((SMB2_HEADER_SIZE + start) as u32);
            (&mut body[32..]).put_u16_le(contexts.len() as u16);
            body.resize(start + context::list_size(contexts), 0);
            context::write_list(&mut body[start..], contexts);
        }
        body
    }

    pub(crate) fn preauth_sha512() -> NegotiateContext {
        NegotiateContext::PreauthIntegrity {
            algorithms: vec![HashAlgorithm::Sha512],
            salt: vec![0x5A; 32],
        }
    }

    fn sample_response(dialect: Revision, contexts: Vec<NegotiateContext>) -> NegotiateResponse {
        NegotiateResponse {
            security_mode: SecurityMode::empty(),
            dialect,
            server_guid: Guid::new_random(),
            capabilities: Capabilities::LARGE_MTU,
            max_transact_size: 8 << 20,
            max_read_size: 8 << 20,
            max_write_size: 8 << 20,
            system_time: Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            server_start_time: None,
            security_buffer: vec![1, 2, 3],
            contexts,
        }
    }

    #[test]
    fn test_request_valid() {
        let body = build_request(1, &[Revision::Smb202, Revision::Smb21], &[]);
        let req = NegotiateRequest::new(&body);
        assert!(req.valid());
        assert_eq!(req.dialect_count(), 2);
        assert_eq!(req.dialects().iter().collect::<Vec<_>>(), vec![Revision::Smb202, Revision::Smb21]);
        assert_eq!(req.security_mode(), SecurityMode::SIGNING_ENABLED);
        assert!(req.capabilities().contains(Capabilities::LARGE_MTU));
        assert!(!req.client_guid().is_zero());
        assert_eq!(req.client_start_time(), None);
    }

    #[test]
    fn test_request_zero_dialects() {
        let body = build_request(1, &[], &[]);
        assert_eq!(body.len(), 36);
        assert!(!NegotiateRequest::new(&body).valid());
    }

    #[test]
    fn test_request_truncated_dialects() {
        let body = build_request(1, &[Revision::Smb202, Revision::Smb21], &[]);
        assert!(!NegotiateRequest::new(&body[..39]).valid());
    }

    #[test]
    fn test_request_fixed_fields() {
        let good = build_request(2, &[Revision::Smb21], &[]);
        assert!(NegotiateRequest::new(&good).valid());

        let mut bad_size = good.clone();
        (&mut bad_size[0..]).put_u16_le(37);
        assert!(!NegotiateRequest::new(&bad_size).valid());

        for mode in [0u16, 3, 4] {
            let mut bad_mode = good.clone();
            (&mut bad_mode[4..]).put_u16_le(mode);
            assert!(!NegotiateRequest::new(&bad_mode).valid(), "mode {}", mode);
        }

        assert!(!NegotiateRequest::new(&good[..35]).valid());
    }

    #[test]
    fn test_request_context_overflow() {
        let body = build_request(1, &[Revision::Smb302, Revision::Smb311], &[preauth_sha512()]);
        assert!(NegotiateRequest::new(&body).valid());

        // Claim more contexts than the buffer holds
        let mut too_many = body.clone();
        (&mut too_many[32..]).put_u16_le(9);
        assert!(!NegotiateRequest::new(&too_many).valid());

        // Context payload cut short
        assert!(!NegotiateRequest::new(&body[..body.len() - 1]).valid());

        // Offset pointing into the header
        let mut into_header = body;
        (&mut into_header[28..]).put_u32_le(16);
        assert!(!NegotiateRequest::new(&into_header).valid());
    }

    #[test]
    fn test_request_empty_context_region_checked() {
        // 3.1.1 offered with no contexts: the offset must still land in the message
        let mut body = build_request(1, &[Revision::Smb311], &[]);
        assert_eq!(body.len(), 38);
        assert!(NegotiateRequest::new(&body).valid());

        (&mut body[28..]).put_u32_le(0xFFFF_FFF0);
        assert!(!NegotiateRequest::new(&body).valid());

        (&mut body[28..]).put_u32_le((SMB2_HEADER_SIZE + 38) as u32);
        assert!(NegotiateRequest::new(&body).valid());
        (&mut body[28..]).put_u32_le((SMB2_HEADER_SIZE + 39) as u32);
        assert!(!NegotiateRequest::new(&body).valid());
    }

    #[test]
    fn test_request_contexts_ignored_without_311() {
        let mut body = build_request(1, &[Revision::Smb302], &[]);
        (&mut body[28..]).put_u32_le(0xFFFF_FFFF);
        (&mut body[32..]).put_u16_le(4);
        assert!(NegotiateRequest::new(&body).valid());
    }

    #[test]
    fn test_select_dialect() {
        let all = Revision::CONCRETE;
        let with_preauth = build_request(1, &all, &[preauth_sha512()]);
        let req = NegotiateRequest::new(&with_preauth);
        assert!(req.valid());
        assert_eq!(req.select_dialect(&all), Some(Revision::Smb311));
        assert_eq!(req.select_dialect(&[Revision::Smb21, Revision::Smb30]), Some(Revision::Smb30));
        assert_eq!(req.select_dialect(&[Revision::Other(0x0400)]), None);

        // Without a SHA-512 offer 3.1.1 is skipped
        let no_preauth = build_request(1, &all, &[]);
        let req = NegotiateRequest::new(&no_preauth);
        assert_eq!(req.select_dialect(&all), Some(Revision::Smb302));
    }

    #[test]
    fn test_select_cipher() {
        let contexts = [
            preauth_sha512(),
            NegotiateContext::Encryption { ciphers: vec![Cipher::Aes128Ccm, Cipher::Aes256Gcm] },
        ];
        let body = build_request(1, &[Revision::Smb311], &contexts);
        let req = NegotiateRequest::new(&body);
        assert!(req.valid());
        assert_eq!(
            req.select_cipher(&[Cipher::Aes128Gcm, Cipher::Aes128Ccm]),
            Some(Cipher::Aes128Ccm)
        );
        assert_eq!(req.select_cipher(&[Cipher::Aes128Gcm]), None);
    }

    #[test]
    fn test_response_marshal() {
        let resp = sample_response(Revision::Smb21, vec![preauth_sha512()]);
        let mut body = vec![0u8; resp.size()];
        assert_eq!(resp.marshal(&mut body).unwrap(), 67);

        let view = NegotiateResponseView::new(&body[..]);
        assert!(view.valid());
        assert_eq!(view.structure_size(), 65);
        assert_eq!(view.security_mode(), SecurityMode::SIGNING_ENABLED);
        assert_eq!(view.dialect_revision(), Revision::Smb21);
        assert_eq!(view.server_guid(), resp.server_guid);
        assert_eq!(view.capabilities(), Capabilities::LARGE_MTU);
        assert_eq!(view.max_transact_size(), 8 << 20);
        assert_eq!(view.max_read_size(), 8 << 20);
        assert_eq!(view.max_write_size(), 8 << 20);
        assert_eq!(view.system_time(), resp.system_time);
        assert_eq!(view.server_start_time(), None);
        assert_eq!(view.security_buffer_offset(), 128);
        assert_eq!(view.security_buffer(), &[1, 2, 3]);
        // Contexts are dropped below 3.1.1
        assert_eq!(view.context_count(), 0);
        assert_eq!(view.context_offset(), 0);
    }

    #[test]
    fn test_response_marshal_contexts() {
        let contexts = vec![
            preauth_sha512(),
            NegotiateContext::Encryption { ciphers: vec![Cipher::Aes128Gcm] },
        ];
        let resp = sample_response(Revision::Smb311, contexts);
        // 64 fixed + 3 security, aligned to 72; preauth 46, pad 2, encryption 12
        assert_eq!(resp.size(), 72 + 60);
        let mut body = vec![0xFFu8; resp.size()];
        resp.marshal(&mut body).unwrap();

        let view = NegotiateResponseView::new(&body[..]);
        assert!(view.valid());
        assert_eq!(view.context_count(), 2);
        assert_eq!(view.context_offset(), 136);
        assert!(body[67..72].iter().all(|&b| b == 0));
        let list = view.contexts();
        let preauth = list.find(2, ContextType::PreauthIntegrity).unwrap();
        let caps = preauth.preauth_integrity().unwrap();
        assert_eq!(caps.algorithms().member(0).as_u16(), 1);
        assert_eq!(caps.salt().len(), 32);
        let enc = list.find(2, ContextType::Encryption).unwrap().encryption().unwrap();
        assert!(enc.ciphers().contains(Cipher::Aes128Gcm));
    }

    #[test]
    fn test_response_rejects_large_security_buffer() {
        let mut resp = sample_response(Revision::Smb202, vec![]);
        resp.security_buffer = vec![0u8; MAX_SECURITY_BUFFER + 1];
        let mut body = vec![0u8; resp.size()];
        let err = resp.marshal(&mut body).unwrap_err();
        assert!(matches!(err, ServerError::SecurityBufferTooLarge(n) if n == MAX_SECURITY_BUFFER + 1));
        assert!(body.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_response_rejects_small_destination() {
        let resp = sample_response(Revision::Smb202, vec![]);
        let mut body = vec![0u8; resp.size() - 1];
        let err = resp.marshal(&mut body).unwrap_err();
        assert!(matches!(err, ServerError::BufferTooSmall { needed: 67, available: 66 }));
    }

    #[test]
    fn test_response_view_invalid() {
        let resp = sample_response(Revision::Smb202, vec![]);
        let mut body = vec![0u8; resp.size()];
        resp.marshal(&mut body).unwrap();

        let mut bad_size = body.clone();
        (&mut bad_size[0..]).put_u16_le(64);
        assert!(!NegotiateResponseView::new(&bad_size[..]).valid());

        let mut sec_overflow = body.clone();
        (&mut sec_overflow[58..]).put_u16_le(4);
        assert!(!NegotiateResponseView::new(&sec_overflow[..]).valid());

        assert!(!NegotiateResponseView::new(&body[..63]).valid());
    }
}
