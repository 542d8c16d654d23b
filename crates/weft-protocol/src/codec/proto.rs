// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protobuf batch codec.
//!
//! The message types are hand-derived with `prost` so the crate builds
//! without `protoc`. Map fields use `btree_map` and request options travel
//! as canonical JSON bytes, keeping encoded output deterministic.

use std::collections::BTreeMap;

use prost::Message;
use tracing::trace;

use crate::command::{Command, ErrorCode, Failure, JsonMap, Payload, Request, Response};

use super::{Codec, CodecError};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbPayload {
    #[prost(btree_map = "string, bytes", tag = "1")]
    pub metadata: BTreeMap<String, Vec<u8>>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbFailure {
    #[prost(enumeration = "PbErrorCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, optional, boxed, tag = "3")]
    pub cause: Option<Box<PbFailure>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PbErrorCode {
    Unknown = 0,
    InvalidArgument = 1,
    OutOfRange = 2,
    IllegalState = 3,
    AlreadyStarted = 4,
    Canceled = 5,
    Terminated = 6,
    Protocol = 7,
    NotImplemented = 8,
    Internal = 9,
}

/// Payload list wrapper so an empty success result stays distinguishable
/// from an absent one.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbPayloadList {
    #[prost(message, repeated, tag = "1")]
    pub payloads: Vec<PbPayload>,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum PbResult {
    #[prost(message, tag = "6")]
    Payloads(PbPayloadList),
    #[prost(message, tag = "7")]
    Failure(PbFailure),
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbCommand {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, optional, tag = "2")]
    pub command: Option<String>,
    /// Canonical JSON bytes; empty means no options.
    #[prost(bytes = "vec", tag = "3")]
    pub options: Vec<u8>,
    #[prost(message, repeated, tag = "4")]
    pub payloads: Vec<PbPayload>,
    #[prost(btree_map = "string, string", tag = "5")]
    pub header: BTreeMap<String, String>,
    #[prost(oneof = "PbResult", tags = "6, 7")]
    pub result: Option<PbResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbCommandBatch {
    #[prost(message, repeated, tag = "1")]
    pub commands: Vec<PbCommand>,
}

impl From<ErrorCode> for PbErrorCode {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Unknown => Self::Unknown,
            ErrorCode::InvalidArgument => Self::InvalidArgument,
            ErrorCode::OutOfRange => Self::OutOfRange,
            ErrorCode::IllegalState => Self::IllegalState,
            ErrorCode::AlreadyStarted => Self::AlreadyStarted,
            ErrorCode::Canceled => Self::Canceled,
            ErrorCode::Terminated => Self::Terminated,
            ErrorCode::Protocol => Self::Protocol,
            ErrorCode::NotImplemented => Self::NotImplemented,
            ErrorCode::Internal => Self::Internal,
        }
    }
}

impl From<PbErrorCode> for ErrorCode {
    fn from(code: PbErrorCode) -> Self {
        match code {
            PbErrorCode::Unknown => Self::Unknown,
            PbErrorCode::InvalidArgument => Self::InvalidArgument,
            PbErrorCode::OutOfRange => Self::OutOfRange,
            PbErrorCode::IllegalState => Self::IllegalState,
            PbErrorCode::AlreadyStarted => Self::AlreadyStarted,
            PbErrorCode::Canceled => Self::Canceled,
            PbErrorCode::Terminated => Self::Terminated,
            PbErrorCode::Protocol => Self::Protocol,
            PbErrorCode::NotImplemented => Self::NotImplemented,
            PbErrorCode::Internal => Self::Internal,
        }
    }
}

impl From<&Payload> for PbPayload {
    fn from(payload: &Payload) -> Self {
        Self {
            metadata: payload.metadata.clone(),
            data: payload.data.clone(),
        }
    }
}

impl From<PbPayload> for Payload {
    fn from(payload: PbPayload) -> Self {
        Self {
            metadata: payload.metadata,
            data: payload.data,
        }
    }
}

impl From<&Failure> for PbFailure {
    fn from(failure: &Failure) -> Self {
        Self {
            code: PbErrorCode::from(failure.code) as i32,
            message: failure.message.clone(),
            cause: failure
                .cause
                .as_deref()
                .map(|cause| Box::new(PbFailure::from(cause))),
        }
    }
}

impl From<PbFailure> for Failure {
    fn from(failure: PbFailure) -> Self {
        Self {
            code: PbErrorCode::try_from(failure.code)
                .unwrap_or(PbErrorCode::Unknown)
                .into(),
            message: failure.message,
            cause: failure
                .cause
                .map(|cause| Box::new(Failure::from(*cause))),
        }
    }
}

fn encode_command(command: &Command) -> Result<PbCommand, CodecError> {
    Ok(match command {
        Command::Request(req) => PbCommand {
            id: req.id,
            command: Some(req.name.clone()),
            options: if req.options.is_empty() {
                Vec::new()
            } else {
                serde_json::to_vec(&req.options)?
            },
            payloads: req.payloads.iter().map(PbPayload::from).collect(),
            header: req.header.clone(),
            result: None,
        },
        Command::Response(resp) => PbCommand {
            id: resp.id,
            result: Some(match &resp.result {
                Ok(payloads) => PbResult::Payloads(PbPayloadList {
                    payloads: payloads.iter().map(PbPayload::from).collect(),
                }),
                Err(failure) => PbResult::Failure(PbFailure::from(failure)),
            }),
            ..Default::default()
        },
    })
}

fn decode_command(pb: PbCommand) -> Result<Command, CodecError> {
    match pb.command {
        Some(name) => {
            if pb.result.is_some() {
                return Err(CodecError::Malformed(format!(
                    "request {} carries a result",
                    pb.id
                )));
            }
            let options: JsonMap = if pb.options.is_empty() {
                JsonMap::new()
            } else {
                serde_json::from_slice(&pb.options)?
            };
            Ok(Command::Request(Request {
                id: pb.id,
                name,
                options,
                payloads: pb.payloads.into_iter().map(Payload::from).collect(),
                header: pb.header,
            }))
        }
        None => match pb.result {
            Some(PbResult::Payloads(list)) => Ok(Command::Response(Response {
                id: pb.id,
                result: Ok(list.payloads.into_iter().map(Payload::from).collect()),
            })),
            Some(PbResult::Failure(failure)) => Ok(Command::Response(Response::failure(
                pb.id,
                Failure::from(failure),
            ))),
            None => Err(CodecError::Malformed(format!(
                "command {} carries neither a name nor a result",
                pb.id
            ))),
        },
    }
}

/// Protobuf framing.
#[derive(Debug, Default)]
pub struct ProtoCodec;

impl Codec for ProtoCodec {
    fn name(&self) -> &'static str {
        "protobuf"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Command>, CodecError> {
        let batch = PbCommandBatch::decode(bytes)?;
        trace!(commands = batch.commands.len(), "decoded protobuf batch");
        batch.commands.into_iter().map(decode_command).collect()
    }

    fn encode(&self, commands: &[Command]) -> Result<Vec<u8>, CodecError> {
        let batch = PbCommandBatch {
            commands: commands
                .iter()
                .map(encode_command)
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(batch.encode_to_vec())
    }
}
