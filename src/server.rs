//! SMB2 server: connection handling and dialect negotiation.
//!
//! Each TCP connection runs as an independent async task that owns its
//! dialect state and credit sequencer. Messages are processed strictly in
//! order; `handle_message` is synchronous and never touches the socket.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{build_error_response_body, ServerError, ERROR_RESPONSE_BODY_SIZE};
use crate::msgpool::{Message, MessagePool};
use crate::sequencer::Sequencer;
use crate::smb2::capabilities::{Cipher, HashAlgorithm};
use crate::smb2::context::{ContextType, NegotiateContext};
use crate::smb2::dialect::{DialectState, IllegalTransition, Revision};
use crate::smb2::flags::{Capabilities, HeaderFlags, SecurityMode};
use crate::smb2::guid::Guid;
use crate::smb2::header::{HeaderTarget, PacketHeader, SMB2_HEADER_SIZE};
use crate::smb2::multiproto::MultiProtocolRequest;
use crate::smb2::negotiate::{NegotiateRequest, NegotiateResponse};
use crate::smb2::status::NtStatus;
use crate::smb2::Smb2Command;
use crate::transport;

/// Ciphers the server accepts, most preferred first.
const CIPHER_PREFERENCE: [Cipher; 2] = [Cipher::Aes128Gcm, Cipher::Aes128Ccm];

/// Length of the preauth integrity salt sent by the server.
const PREAUTH_SALT_SIZE: usize = 32;

const ACCEPT_DELAY_MIN: Duration = Duration::from_millis(5);
const ACCEPT_DELAY_MAX: Duration = Duration::from_secs(1);

// ---- Public types ----

/// Shared, immutable server state (one per server process).
pub struct ServerState {
    pub config: Config,
    pub server_guid: Guid,
    pub pool: Arc<MessagePool>,
    dialects: Vec<Revision>,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        let server_guid = config
            .parsed_server_guid()
            .ok()
            .flatten()
            .unwrap_or_else(Guid::new_random);
        let dialects = config.negotiation.revisions();
        ServerState {
            config,
            server_guid,
            pool: MessagePool::new(),
            dialects,
        }
    }

    fn security_mode(&self) -> SecurityMode {
        if self.config.negotiation.require_signing {
            SecurityMode::SIGNING_ENABLED | SecurityMode::SIGNING_REQUIRED
        } else {
            SecurityMode::SIGNING_ENABLED
        }
    }
}

// ---- Per-connection state ----

/// Per-connection mutable state, owned by the connection task.
#[derive(Debug)]
pub struct ConnectionState {
    pub dialect: DialectState,
    pub sequencer: Sequencer,
    pub client_capabilities: Capabilities,
    pub client_security_mode: SecurityMode,
    pub client_guid: Guid,
    pub cipher: Option<Cipher>,
    /// Server name the client addressed, from its 3.1.1 net name context
    pub client_net_name: Option<String>,
    pub max_transact_size: u32,
    pub max_read_size: u32,
    pub max_write_size: u32,
    pub supports_multi_credit: bool,
    pub creation_time: SystemTime,
}

impl ConnectionState {
    pub fn new(config: &Config) -> Self {
        ConnectionState {
            dialect: DialectState::Uninitialized,
            sequencer: Sequencer::new(config.credits.limit as usize),
            client_capabilities: Capabilities::empty(),
            client_security_mode: SecurityMode::empty(),
            client_guid: Guid::ZERO,
            cipher: None,
            client_net_name: None,
            max_transact_size: 0,
            max_read_size: 0,
            max_write_size: 0,
            supports_multi_credit: false,
            creation_time: SystemTime::now(),
        }
    }

    /// The first message of a connection is implicitly granted sequence
    /// number 0.
    fn open_initial_window(&mut self) -> Result<(), ServerError> {
        if self.sequencer.next_grant() == 0 {
            self.sequencer.expand(1)?;
        }
        Ok(())
    }

    fn apply_negotiated_sizes(&mut self, config: &Config) {
        self.max_transact_size = config.negotiation.max_transact_size;
        self.max_read_size = config.negotiation.max_read_size;
        self.max_write_size = config.negotiation.max_write_size;
    }
}

// ---- Connection entrypoint ----

/// Pause before the next accept after a failed one: 5ms, doubling up to 1s.
pub fn next_accept_delay(last: Duration) -> Duration {
    if last.is_zero() {
        ACCEPT_DELAY_MIN
    } else {
        (last * 2).min(ACCEPT_DELAY_MAX)
    }
}

/// Handle a single SMB2 client connection.
///
/// Reads frames in a loop, processes each, and writes the response. Exits
/// on connection close, shutdown, or a fatal protocol error.
pub async fn handle_connection<S>(
    mut stream: S,
    server: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = ConnectionState::new(&server.config);

    loop {
        if *shutdown.borrow() {
            debug!("Shutdown requested");
            return Ok(());
        }

        let frame = tokio::select! {
            frame = transport::read_frame(&mut stream, &server.pool) => frame?,
            Ok(()) = shutdown.changed() => continue,
        };
        let msg = match frame {
            Some(msg) => msg,
            None => {
                debug!("Client disconnected");
                return Ok(());
            }
        };
        debug!(length = msg.len(), "Received message");

        match handle_message(&mut conn, &server, &msg) {
            Ok(Some(resp)) => transport::write_frame(&mut stream, &resp).await?,
            Ok(None) => {}
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Message rejected");
            }
            Err(e) => {
                warn!(error = %e, dialect = %conn.dialect, "Terminating connection");
                return Err(e);
            }
        }
    }
}

// ---- Message processing ----

/// Process one inbound message and build the response, if any.
///
/// Until negotiation completes, only an SMB1 multi-protocol NEGOTIATE or an
/// SMB2 NEGOTIATE is accepted, and a malformed message ends the connection.
/// Afterwards malformed messages are dropped and every request is admitted
/// through the credit sequencer first.
pub fn handle_message(
    conn: &mut ConnectionState,
    server: &ServerState,
    msg: &[u8],
) -> Result<Option<Message>, ServerError> {
    let header = PacketHeader::new(msg);
    if !header.valid() {
        if conn.dialect.is_ready() {
            warn!(length = msg.len(), "Invalid SMB2 header, message dropped");
            return Ok(None);
        }
        return handle_multi_protocol(conn, server, msg).map(Some);
    }

    if header.is_response() {
        warn!(message_id = header.message_id(), "Response received from client");
        if conn.dialect.is_ready() {
            return Ok(None);
        }
        return Err(ServerError::ParseError("unexpected response flag".into()));
    }

    let body = &msg[SMB2_HEADER_SIZE..];
    debug!(
        command = header.command().map(|c| c.name()).unwrap_or("UNKNOWN"),
        message_id = header.message_id(),
        credit_charge = header.credit_charge(),
        credit_request = header.credits(),
        "Received request"
    );

    if !conn.dialect.is_ready() {
        return match header.command() {
            Some(Smb2Command::Negotiate) => handle_negotiate(conn, server, &header, body).map(Some),
            _ => {
                warn!(command = header.command_code(), dialect = %conn.dialect, "Command before negotiation");
                Err(ServerError::NotNegotiated(header.command_code()))
            }
        };
    }

    dispatch(conn, server, &header, body)
}

/// SMB1 multi-protocol NEGOTIATE that upgrades the connection to SMB2.
/// MS-SMB2 Section 3.3.5.3.1
fn handle_multi_protocol(
    conn: &mut ConnectionState,
    server: &ServerState,
    msg: &[u8],
) -> Result<Message, ServerError> {
    let req = MultiProtocolRequest::new(msg);
    if !req.valid() {
        warn!(length = msg.len(), "Neither an SMB2 nor an SMB1 message");
        return Err(ServerError::ParseError("unrecognised protocol".into()));
    }
    let offer = match req.smb2_offer() {
        Some(offer) => offer,
        None => {
            warn!(command = req.command(), "SMB1 request without an SMB2 dialect");
            return Err(ServerError::ParseError("no SMB2 dialect in multi-protocol negotiate".into()));
        }
    };
    let (target, revision) = match offer.resolve(server.dialects.contains(&Revision::Smb202)) {
        Some(resolved) => resolved,
        None => {
            warn!("Multi-protocol negotiate offers no enabled dialect");
            return Err(ServerError::NoCommonDialect);
        }
    };
    check_transition(conn.dialect, target)?;

    conn.open_initial_window()?;
    conn.sequencer.consume(0).map_err(|e| {
        warn!(error = %e, "Multi-protocol negotiate out of sequence");
        ServerError::from(e)
    })?;
    conn.dialect.transition(target)?;
    conn.apply_negotiated_sizes(&server.config);
    conn.supports_multi_credit = offer.wildcard && server.config.negotiation.multi_credit;
    let granted = grant_one(conn);

    info!(state = %conn.dialect, revision = %revision, "Multi-protocol negotiation complete");

    let resp = NegotiateResponse {
        security_mode: server.security_mode(),
        dialect: revision,
        server_guid: server.server_guid,
        capabilities: server_capabilities(server, conn, revision),
        max_transact_size: conn.max_transact_size,
        max_read_size: conn.max_read_size,
        max_write_size: conn.max_write_size,
        system_time: Some(SystemTime::now()),
        server_start_time: None,
        security_buffer: Vec::new(),
        contexts: Vec::new(),
    };
    let reply = ReplyHeader {
        command: Smb2Command::Negotiate as u16,
        status: NtStatus::Success,
        message_id: 0,
        credit_charge: 0,
        credits: granted,
        session_id: 0,
        target: HeaderTarget::Tree(0),
    };
    build_negotiate_response(&server.pool, &reply, &resp)
}

/// SMB2 NEGOTIATE.
/// MS-SMB2 Section 3.3.5.4
fn handle_negotiate(
    conn: &mut ConnectionState,
    server: &ServerState,
    header: &PacketHeader<&[u8]>,
    body: &[u8],
) -> Result<Message, ServerError> {
    let req = NegotiateRequest::new(body);
    if !req.valid() {
        warn!(length = body.len(), "Malformed NEGOTIATE request");
        return Err(ServerError::ParseError("malformed NEGOTIATE request".into()));
    }
    let revision = match req.select_dialect(&server.dialects) {
        Some(r) => r,
        None => {
            warn!(offered = ?req.dialects(), "No common dialect");
            return Err(ServerError::NoCommonDialect);
        }
    };
    let target = DialectState::Ready(revision);
    check_transition(conn.dialect, target)?;

    conn.open_initial_window()?;
    conn.sequencer.consume(header.message_id()).map_err(|e| {
        warn!(error = %e, message_id = header.message_id(), "NEGOTIATE out of sequence");
        ServerError::from(e)
    })?;
    conn.dialect.transition(target)?;
    conn.apply_negotiated_sizes(&server.config);
    conn.client_capabilities = req.capabilities();
    conn.client_security_mode = req.security_mode();
    conn.client_guid = req.client_guid();
    conn.supports_multi_credit = revision != Revision::Smb202 && server.config.negotiation.multi_credit;

    let mut contexts = Vec::new();
    if revision == Revision::Smb311 {
        conn.client_net_name = req.find_context(ContextType::NetName).and_then(|c| c.net_name());
        if let Some(caps) = req.find_context(ContextType::Compression).and_then(|c| c.compression()) {
            debug!(algorithms = ?caps.algorithms(), flags = caps.flags(), "Compression offered, not negotiated");
        }

        let mut salt = vec![0u8; PREAUTH_SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        contexts.push(NegotiateContext::PreauthIntegrity {
            algorithms: vec![HashAlgorithm::Sha512],
            salt,
        });
        if server.config.negotiation.encryption {
            conn.cipher = req.select_cipher(&CIPHER_PREFERENCE);
            if let Some(cipher) = conn.cipher {
                contexts.push(NegotiateContext::Encryption { ciphers: vec![cipher] });
            }
        }
    }
    let granted = grant_one(conn);

    info!(
        dialect = %revision,
        client_guid = %conn.client_guid,
        cipher = ?conn.cipher,
        multi_credit = conn.supports_multi_credit,
        "Negotiated dialect"
    );

    let resp = NegotiateResponse {
        security_mode: server.security_mode(),
        dialect: revision,
        server_guid: server.server_guid,
        capabilities: server_capabilities(server, conn, revision),
        max_transact_size: conn.max_transact_size,
        max_read_size: conn.max_read_size,
        max_write_size: conn.max_write_size,
        system_time: Some(SystemTime::now()),
        server_start_time: None,
        security_buffer: Vec::new(),
        contexts,
    };
    let reply = ReplyHeader::for_request(header, NtStatus::Success, granted);
    build_negotiate_response(&server.pool, &reply, &resp)
}

/// Requests after negotiation: admit through the sequencer, then answer.
/// Only NEGOTIATE has a handler, and it always fails once ready.
fn dispatch(
    conn: &mut ConnectionState,
    server: &ServerState,
    header: &PacketHeader<&[u8]>,
    body: &[u8],
) -> Result<Option<Message>, ServerError> {
    let command = header.command();

    // CANCEL carries no credits and gets no response of its own
    if command == Some(Smb2Command::Cancel) {
        debug!(message_id = header.message_id(), "Ignoring CANCEL");
        return Ok(None);
    }

    let charge = if conn.supports_multi_credit { header.credit_charge().max(1) } else { 1 };
    conn.sequencer
        .consume_range(header.message_id(), charge as usize)
        .map_err(|e| {
            warn!(error = %e, message_id = header.message_id(), charge, "Credit violation");
            ServerError::from(e)
        })?;

    match command {
        Some(Smb2Command::Negotiate) => handle_negotiate(conn, server, header, body).map(Some),
        _ => {
            let granted = grant(conn, server, header.credits());
            debug!(command = header.command_code(), granted, "Command not supported");
            let reply = ReplyHeader::for_request(header, NtStatus::NotSupported, granted);
            Ok(Some(build_error_response(&server.pool, &reply)))
        }
    }
}

/// Reject an illegal transition before any credit is consumed for it.
fn check_transition(from: DialectState, to: DialectState) -> Result<(), ServerError> {
    if from.can_transition(to) {
        return Ok(());
    }
    warn!(from = %from, to = %to, "Illegal dialect transition");
    Err(IllegalTransition { from, to }.into())
}

// ---- Credits ----

/// Grant what the client asked for, at least one, capped by `max_grant`
/// and by the room left under the connection limit.
fn grant(conn: &mut ConnectionState, server: &ServerState, requested: u16) -> u16 {
    let wanted = requested.max(1).min(server.config.credits.max_grant) as usize;
    let n = wanted.min(conn.sequencer.available());
    match conn.sequencer.expand(n) {
        Ok(()) => n as u16,
        Err(e) => {
            warn!(error = %e, requested, "Credit grant refused");
            0
        }
    }
}

/// The single credit granted with a NEGOTIATE response.
fn grant_one(conn: &mut ConnectionState) -> u16 {
    match conn.sequencer.expand(1) {
        Ok(()) => 1,
        Err(e) => {
            warn!(error = %e, "Credit grant refused");
            0
        }
    }
}

fn server_capabilities(server: &ServerState, conn: &ConnectionState, revision: Revision) -> Capabilities {
    let mut caps = Capabilities::empty();
    if conn.supports_multi_credit {
        caps |= Capabilities::LARGE_MTU;
    }
    // 3.1.1 negotiates encryption through a context instead
    if server.config.negotiation.encryption
        && matches!(revision, Revision::Smb30 | Revision::Smb302)
        && conn.client_capabilities.contains(Capabilities::ENCRYPTION)
    {
        caps |= Capabilities::ENCRYPTION;
    }
    caps
}

// ---- Response building ----

/// Fields of an outgoing SMB2 header.
struct ReplyHeader {
    command: u16,
    status: NtStatus,
    message_id: u64,
    credit_charge: u16,
    credits: u16,
    session_id: u64,
    target: HeaderTarget,
}

impl ReplyHeader {
    fn for_request(req: &PacketHeader<&[u8]>, status: NtStatus, credits: u16) -> Self {
        ReplyHeader {
            command: req.command_code(),
            status,
            message_id: req.message_id(),
            credit_charge: req.credit_charge(),
            credits,
            session_id: req.session_id(),
            target: req.target(),
        }
    }

    fn write(&self, msg: &mut [u8]) {
        let mut flags = HeaderFlags::SERVER_TO_REDIR;
        if matches!(self.target, HeaderTarget::Async(_)) {
            flags |= HeaderFlags::ASYNC_COMMAND;
        }
        let mut hdr = PacketHeader::new(msg);
        hdr.set_protocol_id();
        hdr.set_structure_size(SMB2_HEADER_SIZE as u16);
        hdr.set_credit_charge(self.credit_charge);
        hdr.set_status(self.status);
        hdr.set_command_code(self.command);
        hdr.set_credits(self.credits);
        hdr.set_flags(flags);
        hdr.set_next_command(0);
        hdr.set_message_id(self.message_id);
        hdr.set_target(self.target);
        hdr.set_session_id(self.session_id);
        hdr.set_signature(&[0u8; 16]);
    }
}

fn build_negotiate_response(
    pool: &Arc<MessagePool>,
    reply: &ReplyHeader,
    resp: &NegotiateResponse,
) -> Result<Message, ServerError> {
    let mut msg = pool.get(SMB2_HEADER_SIZE + resp.size());
    reply.write(&mut msg);
    resp.marshal(&mut msg[SMB2_HEADER_SIZE..])?;
    Ok(msg)
}

fn build_error_response(pool: &Arc<MessagePool>, reply: &ReplyHeader) -> Message {
    let mut msg = pool.get(SMB2_HEADER_SIZE + ERROR_RESPONSE_BODY_SIZE);
    reply.write(&mut msg);
    msg[SMB2_HEADER_SIZE..].copy_from_slice(&build_error_response_body());
    msg
}
