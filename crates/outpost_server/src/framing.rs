//! Length-prefixed framing.
//!
//! Every message is a fixed-width header holding the payload length as
//! left-aligned decimal ASCII padded with spaces, followed by exactly that
//! many bytes of UTF-8 JSON:
//!
//! ```text
//! "27        {\"type\":\"game_status\",...}"
//! ```

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{NetError, Result};

/// Header width in bytes.
pub const HEADER_LEN: usize = 10;
/// Largest payload accepted. Snapshots of a full map stay well below this.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Prefix `payload` with its header.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(NetError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let header = format!("{:<width$}", payload.len(), width = HEADER_LEN);
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Serialize `message` as JSON and frame it.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(message)?;
    encode_frame(&payload)
}

/// Payload length announced by a header.
pub fn parse_header(header: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(header).map_err(|_| NetError::BadHeader(String::from_utf8_lossy(header).into_owned()))?;
    let len: usize = text
        .trim()
        .parse()
        .map_err(|_| NetError::BadHeader(text.to_string()))?;
    if len > MAX_FRAME_LEN {
        return Err(NetError::FrameTooLarge { len, max: MAX_FRAME_LEN });
    }
    Ok(len)
}

/// Read one frame's payload.
///
/// Returns `Ok(None)` when the stream ends cleanly between frames. A stream
/// that ends inside a frame is an error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            return if filled == 0 { Ok(None) } else { Err(NetError::Closed) };
        }
        filled += n;
    }

    let len = parse_header(&header)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => NetError::Closed,
        _ => NetError::Io(e),
    })?;
    Ok(Some(payload))
}

/// Write an already framed buffer and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
