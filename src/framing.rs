//! Browser native messaging framing.
//!
//! Every message is a 4-byte little-endian length followed by that many
//! bytes of UTF-8 JSON.
//!
//! Browsers reject host-to-browser messages over 1 MB, which bounds what
//! `encode_frame` may produce. Browser-to-host messages may be far larger,
//! but meeting state events are a few dozen bytes, so the reader applies
//! the same 1 MiB limit: a longer length prefix means a corrupted stream,
//! not a real event.

use serde::{de::DeserializeOwned, Serialize};
use std::io::{self, Write};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE} bytes)")]
    TooLarge(usize),
    #[error("connection closed in the middle of a frame")]
    Truncated,
    #[error("invalid frame payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Serialize `message` into a complete frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(json.len()));
    }

    let mut frame = Vec::with_capacity(4 + json.len());
    frame.extend_from_slice(&(json.len() as u32).to_le_bytes());
    frame.extend_from_slice(&json);
    Ok(frame)
}

/// Write one frame and flush.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), FrameError> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads frames from an async byte stream such as the host's stdin.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Next raw payload, or `None` on a clean end of stream.
    pub async fn next_payload(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut len_bytes = [0u8; 4];
        let mut filled = 0;
        while filled < len_bytes.len() {
            let n = self.inner.read(&mut len_bytes[filled..]).await?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(FrameError::Truncated)
                };
            }
            filled += n;
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(len));
        }

        let mut payload = vec![0u8; len];
        match self.inner.read_exact(&mut payload).await {
            Ok(_) => Ok(Some(payload)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
            Err(e) => Err(e.into()),
        }
    }

    /// Next frame decoded as `T`.
    pub async fn next<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        match self.next_payload().await? {
            Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }
}
