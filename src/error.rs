//! Error types for the SMB2 server.
//!
//! Everything that can end the processing of a message, and whether the
//! connection survives it.

use crate::sequencer::CreditError;
use crate::smb2::dialect::IllegalTransition;
use std::fmt;

/// Top-level server error type.
#[derive(Debug)]
pub enum ServerError {
    /// An I/O error from the underlying transport.
    Io(std::io::Error),
    /// Direct-TCP framing violation.
    BadFrame(String),
    /// Structural validation failure of an incoming message.
    ParseError(String),
    /// Dialect state machine rejected a transition.
    IllegalTransition(IllegalTransition),
    /// An SMB2 command other than NEGOTIATE arrived before negotiation.
    NotNegotiated(u16),
    /// Credit sequencer refused a grant or a sequence number.
    Credit(CreditError),
    /// The client offered no dialect this server has enabled.
    NoCommonDialect,
    /// Security buffer longer than the response can describe.
    SecurityBufferTooLarge(usize),
    /// Marshaling destination too small.
    BufferTooSmall { needed: usize, available: usize },
}

impl ServerError {
    /// True when the connection may keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Credit(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::BadFrame(msg) => write!(f, "Bad frame: {}", msg),
            Self::ParseError(msg) => write!(f, "Parse error: {}", msg),
            Self::IllegalTransition(t) => write!(f, "Protocol error: {}", t),
            Self::NotNegotiated(cmd) => {
                write!(f, "Protocol error: command 0x{:04x} before negotiation", cmd)
            }
            Self::Credit(e) => write!(f, "Credit error: {}", e),
            Self::NoCommonDialect => write!(f, "No common dialect"),
            Self::SecurityBufferTooLarge(len) => {
                write!(f, "Security buffer too large: {} bytes", len)
            }
            Self::BufferTooSmall { needed, available } => {
                write!(f, "Buffer too small: need {} bytes, have {}", needed, available)
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Credit(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e)
    }
}

impl From<CreditError> for ServerError {
    fn from(e: CreditError) -> Self {
        ServerError::Credit(e)
    }
}

impl From<IllegalTransition> for ServerError {
    fn from(e: IllegalTransition) -> Self {
        ServerError::IllegalTransition(e)
    }
}

/// Size of the SMB2 ERROR response body (no error data).
pub const ERROR_RESPONSE_BODY_SIZE: usize = 9;

/// Build the 9-byte SMB2 error response body (no error data).
/// MS-SMB2 2.2.2
pub fn build_error_response_body() -> [u8; ERROR_RESPONSE_BODY_SIZE] {
    let mut buf = [0u8; ERROR_RESPONSE_BODY_SIZE];
    buf[0] = 9; // StructureSize low byte
    // [2] ErrorContextCount = 0
    // [3] Reserved = 0
    // [4..8] ByteCount = 0
    // [8] ErrorData = 0 (1 byte minimum)
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smb2::dialect::{DialectState, Revision};

    #[test]
    fn test_recoverable() {
        assert!(ServerError::Credit(CreditError::LimitExceeded).is_recoverable());
        assert!(ServerError::Credit(CreditError::CapacityExceeded).is_recoverable());
        assert!(!ServerError::Credit(CreditError::AlreadyConsumed(3)).is_recoverable());
        assert!(!ServerError::NoCommonDialect.is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(!ServerError::from(io).is_recoverable());
    }

    #[test]
    fn test_display() {
        let t = IllegalTransition {
            from: DialectState::Ready(Revision::Smb202),
            to: DialectState::Ready(Revision::Smb311),
        };
        assert_eq!(
            ServerError::from(t).to_string(),
            "Protocol error: illegal dialect transition SMB 2.0.2 -> SMB 3.1.1"
        );
        assert_eq!(
            ServerError::NotNegotiated(5).to_string(),
            "Protocol error: command 0x0005 before negotiation"
        );
    }

    #[test]
    fn test_error_response_body_size() {
        let body = build_error_response_body();
        assert_eq!(body.len(), 9);
        assert_eq!(u16::from_le_bytes([body[0], body[1]]), 9);
    }
}
