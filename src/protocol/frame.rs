//! RESP frame representation and parsing.
//!
//! Parsing works on a `Cursor` over the connection's read buffer. A frame that
//! has not fully arrived yields `FrameError::Incomplete` and the caller reads
//! more bytes before trying again from the start of the buffer.

use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest bulk string accepted from a peer (512 MiB, same as the server).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest array accepted from a peer.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Deepest array nesting accepted from a peer. Commands are flat and server
/// replies nest only a few levels.
pub const MAX_DEPTH: usize = 64;

/// One protocol-encoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

/// Why a frame could not be produced from the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough data buffered yet.
    Incomplete,
    /// The peer sent bytes that are not valid RESP.
    Invalid(String),
}

impl Frame {
    /// Parse one frame starting at the cursor position.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, FrameError> {
        Frame::parse_nested(src, 0)
    }

    fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Frame, FrameError> {
        match get_u8(src)? {
            b'+' => Ok(Frame::Simple(line_string(src)?)),
            b'-' => Ok(Frame::Error(line_string(src)?)),
            b':' => Ok(Frame::Integer(get_decimal(src)?)),
            b'$' => {
                let len = get_decimal(src)?;
                if len == -1 {
                    return Ok(Frame::Null);
                }
                let len = checked_len(len, MAX_BULK_LEN, "bulk")?;
                if src.remaining() < len + 2 {
                    return Err(FrameError::Incomplete);
                }
                let start = src.position() as usize;
                let data = Bytes::copy_from_slice(&src.get_ref()[start..start + len]);
                if &src.get_ref()[start + len..start + len + 2] != b"\r\n" {
                    return Err(FrameError::Invalid("bulk string missing CRLF".into()));
                }
                src.advance(len + 2);
                Ok(Frame::Bulk(data))
            }
            b'*' => {
                let len = get_decimal(src)?;
                if len == -1 {
                    return Ok(Frame::Null);
                }
                let len = checked_len(len, MAX_ARRAY_LEN, "array")?;
                if len > 0 && depth >= MAX_DEPTH {
                    return Err(FrameError::Invalid(format!(
                        "array nesting deeper than {}",
                        MAX_DEPTH
                    )));
                }
                let mut items = Vec::with_capacity(len.min(64));
                for _ in 0..len {
                    items.push(Frame::parse_nested(src, depth + 1)?);
                }
                Ok(Frame::Array(items))
            }
            other => Err(FrameError::Invalid(format!(
                "unexpected type byte 0x{:02x}",
                other
            ))),
        }
    }

    /// Append the wire encoding of this frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Error(s) => {
                dst.put_u8(b'-');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                dst.put_slice(format!(":{}\r\n", n).as_bytes());
            }
            Frame::Bulk(data) => {
                dst.put_slice(format!("${}\r\n", data.len()).as_bytes());
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::Null => dst.put_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                dst.put_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(dst);
                }
            }
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// The message carried by an error frame.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Frame::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Encode a command as an array of bulk strings.
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        let arg = arg.as_ref();
        buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
    buf.freeze()
}

fn checked_len(len: i64, max: usize, kind: &str) -> Result<usize, FrameError> {
    if len < 0 || len as u64 > max as u64 {
        return Err(FrameError::Invalid(format!("invalid {} length {}", kind, len)));
    }
    Ok(len as usize)
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, FrameError> {
    if !src.has_remaining() {
        return Err(FrameError::Incomplete);
    }
    Ok(src.get_u8())
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], FrameError> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();
    if buf.len() < 2 {
        return Err(FrameError::Incomplete);
    }
    for i in start..buf.len() - 1 {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }
    Err(FrameError::Incomplete)
}

// Status lines may carry arbitrary bytes (servers echo keys and command
// names); the exact bytes travel in the raw buffer, so a lossy copy is enough.
fn line_string(src: &mut Cursor<&[u8]>) -> Result<String, FrameError> {
    let line = get_line(src)?;
    Ok(String::from_utf8_lossy(line).into_owned())
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, FrameError> {
    let line = get_line(src)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| FrameError::Invalid("invalid integer".into()))
}
