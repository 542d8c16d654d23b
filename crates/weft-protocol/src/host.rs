// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Host connection seam.
//!
//! The worker runtime never owns a socket; it talks to the sidecar host
//! through [`HostConnection`]. Two connections are provided:
//! [`ChannelHost`] (in-memory pair, used by embedding code and tests) and
//! [`FramedHost`] (length-prefixed frames over any `Read`/`Write` pair).

use std::sync::mpsc::{Receiver, Sender, channel};

use thiserror::Error;
use tracing::{debug, warn};

use crate::command::JsonMap;
use crate::frame::{Frame, FrameError, FrameType, read_frame, write_frame};

/// One delivery from the host: codec-encoded messages plus batch context.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Codec-encoded command batch.
    pub messages: Vec<u8>,
    /// Free-form batch context; `taskQueue` routes to a worker.
    pub context: JsonMap,
}

impl Batch {
    /// Create a batch with empty context.
    pub fn new(messages: Vec<u8>) -> Self {
        Self {
            messages,
            context: JsonMap::new(),
        }
    }

    /// Attach a context entry.
    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }
}

/// Errors on the host link.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host link closed")]
    Closed,

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("invalid batch context: {0}")]
    Context(String),
}

/// The boundary to the sidecar that brokers traffic with the service.
pub trait HostConnection {
    /// Block until the next batch arrives. `Ok(None)` means end-of-stream.
    fn wait_batch(&mut self) -> Result<Option<Batch>, HostError>;

    /// Send an encoded outbound batch.
    fn send(&mut self, frame: &[u8]) -> Result<(), HostError>;

    /// Report a contained per-batch failure. Best effort.
    fn error(&mut self, message: &str);
}

// ============================================================================
// In-memory channel connection
// ============================================================================

enum HostEvent {
    Batch(Batch),
    End,
}

/// In-memory host connection backed by channels.
pub struct ChannelHost {
    inbound: Receiver<HostEvent>,
    sent: Sender<Vec<u8>>,
    errors: Sender<String>,
}

/// Driver side of a [`ChannelHost`] pair.
///
/// Embedding code and tests use this to enqueue batches and observe what
/// the worker sent back.
pub struct HostHandle {
    batches: Sender<HostEvent>,
    sent: Receiver<Vec<u8>>,
    errors: Receiver<String>,
}

impl ChannelHost {
    /// Create a connected connection/driver pair.
    pub fn pair() -> (Self, HostHandle) {
        let (batch_tx, batch_rx) = channel();
        let (sent_tx, sent_rx) = channel();
        let (error_tx, error_rx) = channel();
        (
            Self {
                inbound: batch_rx,
                sent: sent_tx,
                errors: error_tx,
            },
            HostHandle {
                batches: batch_tx,
                sent: sent_rx,
                errors: error_rx,
            },
        )
    }
}

impl HostConnection for ChannelHost {
    fn wait_batch(&mut self) -> Result<Option<Batch>, HostError> {
        match self.inbound.recv() {
            Ok(HostEvent::Batch(batch)) => Ok(Some(batch)),
            Ok(HostEvent::End) | Err(_) => Ok(None),
        }
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), HostError> {
        self.sent.send(frame.to_vec()).map_err(|_| HostError::Closed)
    }

    fn error(&mut self, message: &str) {
        warn!(message, "per-batch failure reported to host");
        let _ = self.errors.send(message.to_string());
    }
}

impl HostHandle {
    /// Enqueue a batch for the worker.
    pub fn push(&self, batch: Batch) {
        let _ = self.batches.send(HostEvent::Batch(batch));
    }

    /// Signal end-of-stream; `run()` will return 0 after draining.
    pub fn end(&self) {
        let _ = self.batches.send(HostEvent::End);
    }

    /// Take the next frame the worker sent, if any.
    pub fn take_sent(&self) -> Option<Vec<u8>> {
        self.sent.try_recv().ok()
    }

    /// Block for the next sent frame, up to `timeout`.
    pub fn recv_sent(&self, timeout: std::time::Duration) -> Option<Vec<u8>> {
        self.sent.recv_timeout(timeout).ok()
    }

    /// Take the next reported error, if any.
    pub fn take_error(&self) -> Option<String> {
        self.errors.try_recv().ok()
    }

    /// Block for the next reported error, up to `timeout`.
    pub fn recv_error(&self, timeout: std::time::Duration) -> Option<String> {
        self.errors.recv_timeout(timeout).ok()
    }
}

// ============================================================================
// Framed stream connection
// ============================================================================

/// Host connection over a framed byte stream (sidecar pipe or socket).
pub struct FramedHost<R, W> {
    reader: R,
    writer: W,
}

impl<R: std::io::Read, W: std::io::Write> FramedHost<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    fn parse_context(bytes: &[u8]) -> Result<JsonMap, HostError> {
        if bytes.is_empty() {
            return Ok(JsonMap::new());
        }
        serde_json::from_slice(bytes).map_err(|e| HostError::Context(e.to_string()))
    }
}

impl<R: std::io::Read, W: std::io::Write> HostConnection for FramedHost<R, W> {
    fn wait_batch(&mut self) -> Result<Option<Batch>, HostError> {
        loop {
            let frame = match read_frame(&mut self.reader) {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            match frame.frame_type {
                FrameType::Batch => {
                    let (context, messages) = frame.split_batch()?;
                    return Ok(Some(Batch {
                        messages: messages.to_vec(),
                        context: Self::parse_context(&context)?,
                    }));
                }
                FrameType::End => return Ok(None),
                FrameType::Error => {
                    // Host-side error reports are informational here.
                    debug!(
                        message = %String::from_utf8_lossy(&frame.payload),
                        "error frame from host"
                    );
                }
            }
        }
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), HostError> {
        let batch = Frame::batch(b"", frame)?;
        write_frame(&mut self.writer, &batch)?;
        Ok(())
    }

    fn error(&mut self, message: &str) {
        match Frame::error(message) {
            Ok(frame) => {
                if let Err(e) = write_frame(&mut self.writer, &frame) {
                    warn!(error = %e, "failed to report error to host");
                }
            }
            Err(e) => warn!(error = %e, "failed to build error frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_pair_delivers_batches_in_order() {
        let (mut host, handle) = ChannelHost::pair();
        handle.push(Batch::new(b"first".to_vec()));
        handle.push(Batch::new(b"second".to_vec()));
        handle.end();

        assert_eq!(host.wait_batch().unwrap().unwrap().messages, b"first");
        assert_eq!(host.wait_batch().unwrap().unwrap().messages, b"second");
        assert!(host.wait_batch().unwrap().is_none());
    }

    #[test]
    fn test_channel_end_on_dropped_handle() {
        let (mut host, handle) = ChannelHost::pair();
        drop(handle);
        assert!(host.wait_batch().unwrap().is_none());
    }

    #[test]
    fn test_channel_send_and_error_collection() {
        let (mut host, handle) = ChannelHost::pair();
        host.send(b"out").unwrap();
        host.error("boom");

        assert_eq!(handle.take_sent(), Some(b"out".to_vec()));
        assert_eq!(handle.take_error(), Some("boom".to_string()));
        assert!(handle.take_sent().is_none());
    }

    #[test]
    fn test_batch_with_context() {
        let batch =
            Batch::new(vec![]).with_context("taskQueue", serde_json::json!("default"));
        assert_eq!(
            batch.context.get("taskQueue"),
            Some(&serde_json::json!("default"))
        );
    }

    #[test]
    fn test_framed_host_roundtrip() {
        let mut wire = Vec::new();
        let batch_frame = Frame::batch(br#"{"taskQueue":"a"}"#, b"payload").unwrap();
        write_frame(&mut wire, &batch_frame).unwrap();
        write_frame(&mut wire, &Frame::end()).unwrap();

        let mut host = FramedHost::new(std::io::Cursor::new(wire), Vec::new());
        let batch = host.wait_batch().unwrap().unwrap();
        assert_eq!(batch.messages, b"payload");
        assert_eq!(batch.context.get("taskQueue"), Some(&serde_json::json!("a")));
        assert!(host.wait_batch().unwrap().is_none());
    }

    #[test]
    fn test_framed_host_eof_is_end() {
        let mut host = FramedHost::new(std::io::Cursor::new(Vec::new()), Vec::new());
        assert!(host.wait_batch().unwrap().is_none());
    }

    #[test]
    fn test_framed_host_invalid_context_rejected() {
        let mut wire = Vec::new();
        let batch_frame = Frame::batch(b"not json", b"payload").unwrap();
        write_frame(&mut wire, &batch_frame).unwrap();

        let mut host = FramedHost::new(std::io::Cursor::new(wire), Vec::new());
        assert!(matches!(host.wait_batch(), Err(HostError::Context(_))));
    }

    #[test]
    fn test_framed_host_skips_error_frames() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &Frame::error("noise").unwrap()).unwrap();
        write_frame(&mut wire, &Frame::batch(b"", b"real").unwrap()).unwrap();

        let mut host = FramedHost::new(std::io::Cursor::new(wire), Vec::new());
        let batch = host.wait_batch().unwrap().unwrap();
        assert_eq!(batch.messages, b"real");
    }

    #[test]
    fn test_framed_host_send_writes_batch_frame() {
        let mut host = FramedHost::new(std::io::Cursor::new(Vec::new()), Vec::new());
        host.send(b"outbound").unwrap();

        let mut reader = std::io::Cursor::new(host.writer.clone());
        let frame = read_frame(&mut reader).unwrap();
        assert_eq!(frame.frame_type, FrameType::Batch);
        let (context, messages) = frame.split_batch().unwrap();
        assert!(context.is_empty());
        assert_eq!(&messages[..], b"outbound");
    }
}
