//! Length-prefixed packet framing shared by the client and backend sockets.
//!
//! Every packet on the wire is a frame:
//!
//! ```text
//! +-------------------+-----------------------+---------------------+
//! | packet id (VLQ)   | payload length (sVLQ) | payload             |
//! | unsigned 32-bit   | signed 32-bit         | |length| raw bytes  |
//! +-------------------+-----------------------+---------------------+
//! ```
//!
//! Both header fields use a variable-length quantity: 7 bits per byte, most
//! significant group first, with the continuation bit (`0x80`) set on every byte
//! except the last. The signed length folds its sign into the lowest bit before
//! encoding. A negative length marks a payload the game compressed; the relay
//! never inflates it, it only carries the sign through unchanged.
//!
//! Multi-byte fields *inside* payloads are big-endian; [`PacketWriter`] and
//! [`PacketReader`] build and parse those.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest encoding a 32-bit quantity may take.
const MAX_VLQ_BYTES: usize = 5;

/// Default upper bound for a single payload.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Errors raised while decoding or encoding frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The peer closed the stream, either between frames or inside one.
    #[error("connection closed")]
    ConnectionClosed,

    /// A variable-length header field ran past five bytes or out of range.
    #[error("variable-length integer is malformed")]
    MalformedVarInt,

    /// The declared payload length exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// The source produced no complete frame within the socket timeout.
    #[error("timed out waiting for packet")]
    TimedOut,

    /// A payload field ended before it could be read.
    #[error("payload ended unexpectedly")]
    UnexpectedEnd,

    /// A payload string was not valid UTF-8.
    #[error("payload string is not valid UTF-8")]
    InvalidUtf8,

    /// A payload field held a value outside its range.
    #[error("invalid value for payload field `{0}`")]
    InvalidField(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One complete `(id, length, payload)` unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub payload: Vec<u8>,
    /// Set when the length was negative on the wire.
    pub compressed: bool,
}

impl Frame {
    pub fn new(id: u32, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload,
            compressed: false,
        }
    }

    /// The signed length written in the frame header.
    pub fn wire_length(&self) -> i64 {
        let len = self.payload.len() as i64;
        if self.compressed {
            -len
        } else {
            len
        }
    }

    /// Encodes the whole frame into a single buffer.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let length = i32::try_from(self.wire_length()).map_err(|_| CodecError::PayloadTooLarge {
            size: self.payload.len(),
            max: i32::MAX as usize,
        })?;

        let mut buf = Vec::with_capacity(self.payload.len() + 2 * MAX_VLQ_BYTES);
        put_var_u32(&mut buf, self.id);
        put_var_i32(&mut buf, length);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }
}

fn put_vlq(buf: &mut Vec<u8>, value: u64) {
    let mut groups = [0u8; 10];
    let mut count = 0;
    let mut rest = value;
    loop {
        groups[count] = (rest & 0x7f) as u8;
        count += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let byte = if i == 0 { groups[i] } else { groups[i] | 0x80 };
        buf.push(byte);
    }
}

/// Appends an unsigned variable-length quantity.
pub fn put_var_u32(buf: &mut Vec<u8>, value: u32) {
    put_vlq(buf, value as u64);
}

/// Appends a signed variable-length quantity (sign in the lowest bit).
pub fn put_var_i32(buf: &mut Vec<u8>, value: i32) {
    let value = value as i64;
    let folded = if value < 0 {
        ((-(value + 1)) << 1) | 1
    } else {
        value << 1
    };
    put_vlq(buf, folded as u64);
}

fn unfold_signed(raw: u64) -> Result<i32, CodecError> {
    let value = if raw & 1 == 1 {
        -((raw >> 1) as i64) - 1
    } else {
        (raw >> 1) as i64
    };
    i32::try_from(value).map_err(|_| CodecError::MalformedVarInt)
}

fn eof_as_closed(err: std::io::Error) -> CodecError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        CodecError::ConnectionClosed
    } else {
        CodecError::Io(err)
    }
}

async fn read_vlq<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64, CodecError> {
    let mut value: u64 = 0;
    for _ in 0..MAX_VLQ_BYTES {
        let byte = reader.read_u8().await.map_err(eof_as_closed)?;
        value = (value << 7) | (byte & 0x7f) as u64;
        if byte & 0x80 == 0 {
            if value > u32::MAX as u64 {
                return Err(CodecError::MalformedVarInt);
            }
            return Ok(value);
        }
    }
    Err(CodecError::MalformedVarInt)
}

/// Reads one frame, waiting until it is complete.
///
/// A stream that ends anywhere in the frame yields
/// [`CodecError::ConnectionClosed`]; there is no partial-frame recovery.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_payload: usize,
) -> Result<Frame, CodecError> {
    let id = read_vlq(reader).await? as u32;
    let length = unfold_signed(read_vlq(reader).await?)?;

    let size = length.unsigned_abs() as usize;
    if size > max_payload {
        return Err(CodecError::PayloadTooLarge {
            size,
            max: max_payload,
        });
    }

    let mut payload = vec![0u8; size];
    if size > 0 {
        reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;
    }

    Ok(Frame {
        id,
        payload,
        compressed: length < 0,
    })
}

/// Writes one frame and flushes so nothing is left buffered.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), CodecError> {
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Builder for payload bodies.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(value as u8)
    }

    pub fn write_u32_be(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn write_var_u32(&mut self, value: u32) -> &mut Self {
        put_var_u32(&mut self.buf, value);
        self
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Length-prefixed byte array.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        put_var_u32(&mut self.buf, bytes.len() as u32);
        self.write_raw(bytes)
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        put_var_u32(&mut self.buf, value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a payload body.
#[derive(Debug)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEnd);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32_be(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_var_u32(&mut self) -> Result<u32, CodecError> {
        let mut value: u64 = 0;
        for _ in 0..MAX_VLQ_BYTES {
            let byte = self.read_u8()?;
            value = (value << 7) | (byte & 0x7f) as u64;
            if byte & 0x80 == 0 {
                return u32::try_from(value).map_err(|_| CodecError::MalformedVarInt);
            }
        }
        Err(CodecError::MalformedVarInt)
    }

    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.take(len)
    }

    /// Length-prefixed byte array.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_var_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_var_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}
