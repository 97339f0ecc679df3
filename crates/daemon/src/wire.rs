// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket framing: each message is a 4-byte big-endian length followed by a
//! JSON body. [`send`]/[`recv`] move one typed message; the `_timeout`
//! variants wrap them for request/response exchanges, while `Watch` streams
//! use the bare [`recv`] so an idle feed doesn't count as a failure.

use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

/// Upper bound on one frame's JSON body. Output bytes travel inline in
/// responses, so the bound is generous.
pub const MAX_FRAME: usize = 64 << 20;

/// How long a single request/response read or write may take.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum FrameError {
    /// Clean close between frames.
    #[error("peer closed the connection")]
    Closed,

    #[error("frame of {size} bytes exceeds the limit")]
    TooLarge { size: usize },

    #[error("timed out waiting on the socket")]
    Timeout,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write one message: length prefix and body in a single write.
pub async fn send<T, W>(writer: &mut W, msg: &T) -> Result<(), FrameError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_FRAME {
        return Err(FrameError::TooLarge { size: body.len() });
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message. EOF on the length prefix is a clean close; EOF in the
/// middle of a body is the I/O error it looks like.
pub async fn recv<T, R>(reader: &mut R) -> Result<T, FrameError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut prefix).await {
        return Err(match e.kind() {
            ErrorKind::UnexpectedEof => FrameError::Closed,
            _ => FrameError::Io(e),
        });
    }

    let size = u32::from_be_bytes(prefix) as usize;
    if size > MAX_FRAME {
        return Err(FrameError::TooLarge { size });
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// [`send`] bounded by `limit`.
pub async fn send_timeout<T, W>(writer: &mut W, msg: &T, limit: Duration) -> Result<(), FrameError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(limit, send(writer, msg)).await {
        Ok(result) => result,
        Err(_) => Err(FrameError::Timeout),
    }
}

/// [`recv`] bounded by `limit`.
pub async fn recv_timeout<T, R>(reader: &mut R, limit: Duration) -> Result<T, FrameError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(limit, recv(reader)).await {
        Ok(result) => result,
        Err(_) => Err(FrameError::Timeout),
    }
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
