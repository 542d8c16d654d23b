// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for host-link framing.
//!
//! Each frame on a host link has the following format:
//! - 4 bytes: payload length (big-endian)
//! - 2 bytes: frame type
//! - N bytes: payload
//!
//! A `Batch` payload packs a 4-byte context length, the UTF-8 JSON context
//! object, then the codec-encoded message bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frame header size (4 bytes length + 2 bytes type)
pub const HEADER_SIZE: usize = 6;

/// Frame types for the host link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FrameType {
    /// A command batch
    Batch = 1,
    /// An error report
    Error = 2,
    /// End of stream
    End = 3,
}

impl TryFrom<u16> for FrameType {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, FrameError> {
        match value {
            1 => Ok(FrameType::Batch),
            2 => Ok(FrameType::Error),
            3 => Ok(FrameType::End),
            _ => Err(FrameError::InvalidFrameType(value)),
        }
    }
}

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("invalid frame type: {0}")]
    InvalidFrameType(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,
}

/// A framed message with type and payload
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, enforcing the size limit
    pub fn new(frame_type: FrameType, payload: Bytes) -> Result<Self, FrameError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(payload.len()));
        }
        Ok(Self {
            frame_type,
            payload,
        })
    }

    /// Create a batch frame from context JSON and message bytes
    pub fn batch(context_json: &[u8], messages: &[u8]) -> Result<Self, FrameError> {
        let mut buf = BytesMut::with_capacity(4 + context_json.len() + messages.len());
        buf.put_u32(context_json.len() as u32);
        buf.put_slice(context_json);
        buf.put_slice(messages);
        Self::new(FrameType::Batch, buf.freeze())
    }

    /// Create an error frame carrying a UTF-8 message
    pub fn error(message: &str) -> Result<Self, FrameError> {
        Self::new(FrameType::Error, Bytes::copy_from_slice(message.as_bytes()))
    }

    /// Create an end-of-stream frame
    pub fn end() -> Self {
        Self {
            frame_type: FrameType::End,
            payload: Bytes::new(),
        }
    }

    /// Split a batch payload into context JSON and message bytes
    pub fn split_batch(&self) -> Result<(Bytes, Bytes), FrameError> {
        let mut payload = self.payload.clone();
        if payload.len() < 4 {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete batch payload",
            )));
        }
        let context_len = payload.get_u32() as usize;
        if payload.len() < context_len {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete batch context",
            )));
        }
        let context = payload.split_to(context_len);
        Ok((context, payload))
    }

    /// Encode the frame to bytes for wire transmission
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.put_u16(self.frame_type as u16);
        buf.put(self.payload.clone());
        buf.freeze()
    }
}

/// Write a frame to a writer
pub fn write_frame<W: std::io::Write>(writer: &mut W, frame: &Frame) -> Result<(), FrameError> {
    writer.write_all(&frame.encode())?;
    writer.flush()?;
    Ok(())
}

/// Read a frame from a reader.
///
/// A clean EOF at a frame boundary maps to [`FrameError::ConnectionClosed`].
pub fn read_frame<R: std::io::Read>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let frame_type = FrameType::try_from(u16::from_be_bytes([header[4], header[5]]))?;

    if length > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;

    Ok(Frame {
        frame_type,
        payload: Bytes::from(payload),
    })
}
