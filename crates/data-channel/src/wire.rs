//! TCP wire format for block broadcasts.
//!
//! # Wire format
//!
//! ```text
//! REQUEST (sender -> node), one per connection round-trip:
//!   [4 bytes BE: header_len]
//!   [header_len bytes: JSON RequestFrame]
//!   [4 bytes BE: payload_len]
//!   [payload_len bytes: block payload]
//!
//! RESPONSE (node -> sender):
//!   [4 bytes BE: return code]
//! ```
//!
//! A node may serve several requests on one connection; the sender closes
//! the connection after reading the response.

use filebcast_protocol::{RequestFrame, ResponseCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DataChannelError;

/// Largest JSON header accepted (64 KiB).
pub const MAX_HEADER_LEN: usize = 64 * 1024;

pub use filebcast_protocol::constants::MAX_PAYLOAD_LEN;

fn check_len(what: &'static str, len: usize, max: usize) -> Result<(), DataChannelError> {
    if len > max {
        return Err(DataChannelError::FrameTooLarge { what, len, max });
    }
    Ok(())
}

/// Encodes a complete request into one buffer.
///
/// The same buffer is written to every node of a round.
pub fn encode_request(frame: &RequestFrame, payload: &[u8]) -> Result<Vec<u8>, DataChannelError> {
    let header = serde_json::to_vec(frame)?;
    check_len("header", header.len(), MAX_HEADER_LEN)?;
    check_len("payload", payload.len(), MAX_PAYLOAD_LEN)?;

    let mut buf = Vec::with_capacity(8 + header.len() + payload.len());
    buf.extend_from_slice(&(header.len() as u32).to_be_bytes());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Reads a request from the stream.
///
/// Returns `None` if the peer closed the connection before a new request.
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<(RequestFrame, Vec<u8>)>, DataChannelError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let header_len = u32::from_be_bytes(len_buf) as usize;
    check_len("header", header_len, MAX_HEADER_LEN)?;
    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header).await?;
    let frame: RequestFrame = serde_json::from_slice(&header)?;

    let payload_len = reader.read_u32().await? as usize;
    check_len("payload", payload_len, MAX_PAYLOAD_LEN)?;
    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    Ok(Some((frame, payload)))
}

/// Writes the return code for one request.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    code: ResponseCode,
) -> Result<(), DataChannelError> {
    writer.write_u32(code.0).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the return code for one request.
pub async fn read_response<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ResponseCode, DataChannelError> {
    Ok(ResponseCode(reader.read_u32().await?))
}
