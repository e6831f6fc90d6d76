//! Length-prefixed framing for the simulator's TCP stream.
//!
//! Every message on the wire is a frame:
//!
//! ```text
//! +-------------------+-------------------+----------------------+
//! | length (4 bytes)  | type (4 bytes)    |   payload            |
//! | u32 little-endian | u32 little-endian |   (length - 4 bytes) |
//! +-------------------+-------------------+----------------------+
//! ```
//!
//! `length` covers the type field and the payload but not itself, so a frame
//! with no payload carries `length = 4`. The universal acknowledgement frame is
//! always `{12, READBACK, code, aux}`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::messages::MessageType;

/// Bytes occupied by the `type` field, counted inside `length`.
pub const TYPE_FIELD_LEN: u32 = 4;

/// `length` value of an acknowledgement frame.
pub const ACK_FRAME_LEN: u32 = 12;

/// Configuration for the framing layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed payload size in bytes. Default: 1 MB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1_048_576,
        }
    }
}

/// One protocol message unit as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw `length` header as received.
    pub length: u32,
    /// Raw message type code.
    pub kind: u32,
    /// Payload bytes (everything after the type field).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame for sending, computing `length` from the payload.
    pub fn new(kind: MessageType, payload: Vec<u8>) -> Self {
        Self {
            length: TYPE_FIELD_LEN + payload.len() as u32,
            kind: kind.code(),
            payload,
        }
    }

    /// The `{0, 0, empty}` sentinel. Receivers treat it as a no-op.
    pub fn null() -> Self {
        Self {
            length: 0,
            kind: 0,
            payload: Vec::new(),
        }
    }

    /// Whether this is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.length == 0 && self.kind == 0 && self.payload.is_empty()
    }

    /// Decoded message type.
    pub fn message_type(&self) -> MessageType {
        MessageType::from_code(self.kind)
    }

    /// Serialize the frame exactly as it would appear on the wire, using the
    /// stored `length` header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.payload.len());
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.kind.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Errors that can occur during framing operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload size exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// The actual payload size.
        size: u32,
        /// The configured maximum.
        max: u32,
    },

    /// The connection was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the stream is still usable after this error.
    ///
    /// Oversized frames are drained before the error is returned, so the next
    /// read starts on a frame boundary.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::PayloadTooLarge { .. })
    }
}

fn map_eof(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read a single frame from the stream.
///
/// Blocks until the full frame is available. A `length` below 4 yields an
/// empty payload. Returns [`FrameError::ConnectionClosed`] if the peer closes
/// the connection before the frame is complete.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Frame, FrameError> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header).await.map_err(map_eof)?;

    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let kind = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let payload_len = length.saturating_sub(TYPE_FIELD_LEN);
    if payload_len > config.max_payload_size {
        // Skip the body so the stream stays aligned.
        let mut body = reader.take(payload_len as u64);
        let drained = tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
        if drained < payload_len as u64 {
            return Err(FrameError::ConnectionClosed);
        }
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; payload_len as usize];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await.map_err(map_eof)?;
    }

    Ok(Frame {
        length,
        kind,
        payload,
    })
}

/// Write a frame of the given type, prefixing `length = 4 + payload.len()`.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    kind: MessageType,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = payload.len() as u32;
    if len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: config.max_payload_size,
        });
    }

    writer
        .write_all(&(TYPE_FIELD_LEN + len).to_le_bytes())
        .await?;
    writer.write_all(&kind.code().to_le_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;

    Ok(())
}

/// Write the acknowledgement frame `{12, READBACK, code, aux}`.
pub async fn write_ack<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    code: i32,
    aux: u32,
) -> Result<(), FrameError> {
    let mut buf = [0u8; 16];
    buf[0..4].copy_from_slice(&ACK_FRAME_LEN.to_le_bytes());
    buf[4..8].copy_from_slice(&MessageType::Readback.code().to_le_bytes());
    buf[8..12].copy_from_slice(&code.to_le_bytes());
    buf[12..16].copy_from_slice(&aux.to_le_bytes());
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Re-emit a previously received frame verbatim, original `length` included.
pub async fn echo_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), FrameError> {
    writer.write_all(&frame.to_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
