// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON batch codec.
//!
//! A batch is a JSON array of wire commands; binary fields are base64.

use tracing::trace;

use crate::command::{Command, WireCommand};

use super::{Codec, CodecError};

/// JSON array framing.
#[derive(Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Command>, CodecError> {
        let wire: Vec<WireCommand> = serde_json::from_slice(bytes)?;
        trace!(commands = wire.len(), "decoded JSON batch");
        wire.into_iter()
            .map(|w| w.into_command().map_err(|e| CodecError::Malformed(e.to_string())))
            .collect()
    }

    fn encode(&self, commands: &[Command]) -> Result<Vec<u8>, CodecError> {
        let wire: Vec<WireCommand> = commands.iter().map(WireCommand::from).collect();
        Ok(serde_json::to_vec(&wire)?)
    }
}
