//! Line-delimited JSON framing.
//!
//! One exchange is one JSON document serialized on a single line and
//! terminated by `\n`. JSON string escaping keeps multi-line field values on
//! one line, so the frame boundary is always the first raw `\n` byte.
//!
//! ```text
//! {"request_id":"3f2a..","user_id":"alice","type":"cmd","cmd":"uname -a",...}\n
//! {"ok":true,"output":"Linux ...\n","error":"",...}\n
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest request frame the backend accepts (2 MiB).
pub const MAX_FRAME_LEN: usize = 2 * 1024 * 1024;

/// Framing and decoding failures. Fatal to the connection, never retried.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Peer closed the connection before a newline arrived.
    #[error("connection closed before end of frame")]
    Closed,

    /// No newline within the allowed frame length.
    #[error("frame exceeds {0} bytes")]
    TooLarge(usize),

    /// No complete frame before the deadline.
    #[error("timed out waiting for frame")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize `value` as one line and flush it.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read bytes up to and including the first `\n`.
///
/// Fails with [`ProtocolError::Closed`] if the stream ends first and with
/// [`ProtocolError::TooLarge`] once `max_len` bytes pass without a newline.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX);
    reader.take(limit).read_until(b'\n', &mut line).await?;

    if line.last() == Some(&b'\n') {
        return Ok(line);
    }
    if line.len() >= max_len {
        return Err(ProtocolError::TooLarge(max_len));
    }
    Err(ProtocolError::Closed)
}

/// Decode one frame into `T`.
pub fn decode<T: DeserializeOwned>(line: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(line)?)
}
