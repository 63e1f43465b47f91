//! Direct TCP framing for SMB2.
//!
//! Each message is prefixed with a 4-byte header: a zero byte followed by
//! a 24-bit big-endian length.
//!
//! MS-SMB2 Section 2.1: Transport

use std::io::ErrorKind;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServerError;
use crate::msgpool::{Message, MessagePool};

/// Size of the transport header.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest message the 24-bit length can describe.
pub const MAX_MESSAGE_SIZE: usize = 0x00FF_FFFF;

/// Read one framed message into a pooled buffer. Returns `None` when the
/// peer closes the stream between messages.
pub async fn read_frame<S>(stream: &mut S, pool: &Arc<MessagePool>) -> Result<Option<Message>, ServerError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    if header[0] != 0 {
        return Err(ServerError::BadFrame(format!("non-zero header byte 0x{:02x}", header[0])));
    }
    let len = u32::from_be_bytes(header) as usize;

    let mut msg = pool.get(len);
    stream.read_exact(&mut msg).await?;
    Ok(Some(msg))
}

/// Write one framed message with a single write.
pub async fn write_frame<S>(stream: &mut S, data: &[u8]) -> Result<(), ServerError>
where
    S: AsyncWrite + Unpin,
{
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ServerError::BadFrame(format!("message too large: {} bytes", data.len())));
    }
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + data.len());
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}
