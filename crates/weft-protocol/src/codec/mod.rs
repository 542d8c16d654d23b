// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch codecs.
//!
//! Both codecs preserve command order and produce deterministic bytes for
//! a given input: every map on the wire path is BTree-backed.

mod json;
mod proto;

pub use json::JsonCodec;
pub use proto::ProtoCodec;

use thiserror::Error;

use crate::command::Command;

/// Environment entry selecting the batch codec.
pub const CODEC_ENV: &str = "RR_CODEC";

/// Errors produced while encoding or decoding a batch.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed batch: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Encode/decode command batches.
pub trait Codec: Send + Sync {
    /// Codec name as it appears in configuration.
    fn name(&self) -> &'static str;

    /// Decode a batch into commands, preserving order.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Command>, CodecError>;

    /// Encode commands into a batch, preserving order.
    fn encode(&self, commands: &[Command]) -> Result<Vec<u8>, CodecError>;
}

/// Which batch codec to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    /// JSON array framing (the default).
    #[default]
    Json,
    /// Protobuf framing.
    Protobuf,
}

static JSON_CODEC: JsonCodec = JsonCodec;
static PROTO_CODEC: ProtoCodec = ProtoCodec;

impl CodecKind {
    /// Parse a configuration value.
    ///
    /// `protobuf` selects the protobuf codec; anything else, including an
    /// unknown value, degrades to JSON rather than raising.
    pub fn parse(value: &str) -> Self {
        match value {
            "protobuf" => Self::Protobuf,
            _ => Self::Json,
        }
    }

    /// Read the codec selection from `RR_CODEC`.
    pub fn from_env() -> Self {
        std::env::var(CODEC_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    /// The codec instance for this kind.
    pub fn select(&self) -> &'static dyn Codec {
        match self {
            Self::Json => &JSON_CODEC,
            Self::Protobuf => &PROTO_CODEC,
        }
    }
}
