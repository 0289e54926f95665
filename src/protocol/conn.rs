//! Buffered RESP connection with per-operation deadlines.
//!
//! `RespConn` is the generic "synchronous connection with timeout" used on both
//! sides of the proxy: client sessions wrap the accepted socket in one, and
//! every upstream connection owns one once it has dialed.

use std::io::{self, Cursor};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;

use crate::protocol::{Command, ConnError, Frame, FrameError, Reply};

const INITIAL_BUFFER: usize = 8 * 1024;

pub struct RespConn<S> {
    stream: S,
    buffer: BytesMut,
    timeout: Duration,
    frame_limit: Option<usize>,
}

impl<S> RespConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER),
            timeout,
            frame_limit: None,
        }
    }

    /// Cap the size of one incoming frame. `None` lifts the cap.
    pub fn set_frame_limit(&mut self, limit: Option<usize>) {
        self.frame_limit = limit;
    }

    /// Read one complete frame along with its raw bytes.
    pub async fn read_frame(&mut self) -> Result<(Frame, Bytes), ConnError> {
        let timeout = self.timeout;
        loop {
            if let Some(parsed) = self.parse_frame()? {
                return Ok(parsed);
            }

            // Everything buffered belongs to the incomplete frame.
            if let Some(limit) = self.frame_limit {
                if self.buffer.len() >= limit {
                    return Err(frame_too_large(limit));
                }
            }

            let n = time::timeout(timeout, self.stream.read_buf(&mut self.buffer))
                .await
                .map_err(|_| ConnError::Timeout(timeout))??;

            if n == 0 {
                if self.buffer.is_empty() {
                    return Err(ConnError::Closed);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                )
                .into());
            }
        }
    }

    /// Read the next client command.
    pub async fn read_command(&mut self) -> Result<Command, ConnError> {
        let (frame, raw) = self.read_frame().await?;
        Command::from_frame(frame, raw)
    }

    /// Read the next server reply.
    pub async fn read_reply(&mut self) -> Result<Reply, ConnError> {
        let (frame, raw) = self.read_frame().await?;
        Ok(Reply { frame, raw })
    }

    /// Write pre-encoded bytes and flush.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ConnError> {
        let timeout = self.timeout;
        let stream = &mut self.stream;
        time::timeout(timeout, async move {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| ConnError::Timeout(timeout))??;
        Ok(())
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ConnError> {
        self.write_raw(&frame.to_bytes()).await
    }

    /// Write an error reply. Line breaks in `message` are flattened so the
    /// frame stays well-formed.
    pub async fn write_error(&mut self, message: &str) -> Result<(), ConnError> {
        let message = message.replace(['\r', '\n'], " ");
        self.write_frame(&Frame::Error(message)).await
    }

    /// Shut down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result<(), ConnError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn parse_frame(&mut self) -> Result<Option<(Frame, Bytes)>, ConnError> {
        let mut cursor = Cursor::new(&self.buffer[..]);
        match Frame::parse(&mut cursor) {
            Ok(frame) => {
                let len = cursor.position() as usize;
                if let Some(limit) = self.frame_limit.filter(|&limit| len > limit) {
                    return Err(frame_too_large(limit));
                }
                let raw = self.buffer.split_to(len).freeze();
                Ok(Some((frame, raw)))
            }
            Err(FrameError::Incomplete) => Ok(None),
            Err(FrameError::Invalid(msg)) => Err(ConnError::Protocol(msg)),
        }
    }
}

fn frame_too_large(limit: usize) -> ConnError {
    ConnError::Protocol(format!("frame larger than {} bytes", limit))
}
