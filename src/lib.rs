//! SMB2/SMB3 protocol endpoint core.
//!
//! Packet codecs for the SMB2 header, the SMB1 multi-protocol preamble and
//! the NEGOTIATE exchange, the per-connection dialect state machine and
//! credit sequencer, and an async driver that ties them to a TCP stream.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod msgpool;
pub mod sequencer;
pub mod server;
pub mod smb2;
pub mod transport;
