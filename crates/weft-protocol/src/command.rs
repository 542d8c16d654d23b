// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command data model shared by both batch codecs.
//!
//! A command is either a request (carries a `command` name) or a response
//! (references a prior request id and carries payloads or a failure).
//! All maps are BTree-backed so encoded output is deterministic.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};

/// Free-form string map attached to requests and batches.
///
/// The key `taskQueue` routes a request to a specific worker.
pub type Headers = BTreeMap<String, String>;

/// JSON object used for request options and batch context.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Header key that routes a request to a worker.
pub const TASK_QUEUE_HEADER: &str = "taskQueue";

/// An opaque value plus its metadata, as produced by a data converter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    /// Converter metadata (e.g. `encoding`).
    pub metadata: BTreeMap<String, Vec<u8>>,
    /// Raw value bytes.
    pub data: Vec<u8>,
}

impl Payload {
    /// Create a payload with a single `encoding` metadata entry.
    pub fn with_encoding(encoding: &str, data: Vec<u8>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("encoding".to_string(), encoding.as_bytes().to_vec());
        Self { metadata, data }
    }
}

/// Wire-level failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unclassified failure.
    #[default]
    Unknown,
    /// Malformed or ill-typed input (bad header, bad options).
    InvalidArgument,
    /// Addressed entity is not registered (task queue lookup).
    OutOfRange,
    /// Operation not valid in the current lifecycle state.
    IllegalState,
    /// Start issued for a workflow id that already has an execution.
    AlreadyStarted,
    /// Execution ended by cancellation.
    Canceled,
    /// Execution ended by termination.
    Terminated,
    /// Correlation violation (response without a pending request).
    Protocol,
    /// Request kind has no handler.
    NotImplemented,
    /// Internal runtime failure.
    Internal,
}

impl ErrorCode {
    /// Stable string form used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::InvalidArgument => "invalid_argument",
            Self::OutOfRange => "out_of_range",
            Self::IllegalState => "illegal_state",
            Self::AlreadyStarted => "already_started",
            Self::Canceled => "canceled",
            Self::Terminated => "terminated",
            Self::Protocol => "protocol",
            Self::NotImplemented => "not_implemented",
            Self::Internal => "internal",
        }
    }
}

/// A failure travelling in a response or a completion command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Underlying failure, if this one wraps another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Failure>>,
}

impl Failure {
    /// Create a failure with no cause.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Wrap another failure as the cause.
    pub fn with_cause(mut self, cause: Failure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The innermost code of the cause chain.
    pub fn root_code(&self) -> ErrorCode {
        match &self.cause {
            Some(cause) => cause.root_code(),
            None => self.code,
        }
    }

    /// True if the failure or any cause is a cancellation.
    pub fn is_canceled(&self) -> bool {
        self.chain().any(|f| f.code == ErrorCode::Canceled)
    }

    /// Iterate the failure and its cause chain, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &Failure> {
        let mut next = Some(self);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.cause.as_deref();
            Some(current)
        })
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

/// An inbound or outbound instruction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// Correlation id, unique per side of the wire.
    pub id: u64,
    /// Request kind (e.g. `StartWorkflow`, `GetWorkerInfo`).
    pub name: String,
    /// Kind-specific options.
    pub options: JsonMap,
    /// Converter-encoded arguments.
    pub payloads: Vec<Payload>,
    /// Routing and context headers.
    pub header: Headers,
}

impl Request {
    /// Create a request with empty options, payloads and header.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Read a string option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }
}

/// The resolution a response carries.
pub type ResponseResult = Result<Vec<Payload>, Failure>;

/// A response correlated by id to a prior request on the same side.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request this answers.
    pub id: u64,
    /// Payloads on success, failure otherwise.
    pub result: ResponseResult,
}

impl Response {
    /// Create a success response.
    pub fn ok(id: u64, payloads: Vec<Payload>) -> Self {
        Self {
            id,
            result: Ok(payloads),
        }
    }

    /// Create a failure response.
    pub fn failure(id: u64, failure: Failure) -> Self {
        Self {
            id,
            result: Err(failure),
        }
    }
}

/// A tagged record delivered across the host boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// An instruction to execute.
    Request(Request),
    /// A correlated answer to a prior instruction.
    Response(Response),
}

impl Command {
    /// The correlation id of either variant.
    pub fn id(&self) -> u64 {
        match self {
            Command::Request(r) => r.id,
            Command::Response(r) => r.id,
        }
    }
}

impl From<Request> for Command {
    fn from(request: Request) -> Self {
        Command::Request(request)
    }
}

impl From<Response> for Command {
    fn from(response: Response) -> Self {
        Command::Response(response)
    }
}

// ============================================================================
// Wire shape
// ============================================================================

/// Serde shape shared by the JSON codec and option embedding.
///
/// Exactly one of `command` (request) or `payloads`/`failure` (response)
/// discriminates the variant; [`WireCommand::into_command`] enforces this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireCommand {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payloads: Option<Vec<WirePayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

/// Payload with base64-encoded binary fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WirePayload {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub data: String,
}

impl From<&Payload> for WirePayload {
    fn from(payload: &Payload) -> Self {
        Self {
            metadata: payload
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), B64.encode(v)))
                .collect(),
            data: B64.encode(&payload.data),
        }
    }
}

impl WirePayload {
    /// Decode the base64 fields back into a [`Payload`].
    pub fn into_payload(self) -> Result<Payload, base64::DecodeError> {
        let mut metadata = BTreeMap::new();
        for (k, v) in self.metadata {
            metadata.insert(k, B64.decode(v)?);
        }
        Ok(Payload {
            metadata,
            data: B64.decode(self.data)?,
        })
    }
}

impl From<&Command> for WireCommand {
    fn from(command: &Command) -> Self {
        match command {
            Command::Request(req) => WireCommand {
                id: req.id,
                command: Some(req.name.clone()),
                options: if req.options.is_empty() {
                    None
                } else {
                    Some(req.options.clone())
                },
                payloads: if req.payloads.is_empty() {
                    None
                } else {
                    Some(req.payloads.iter().map(WirePayload::from).collect())
                },
                header: if req.header.is_empty() {
                    None
                } else {
                    Some(req.header.clone())
                },
                failure: None,
            },
            Command::Response(resp) => match &resp.result {
                Ok(payloads) => WireCommand {
                    id: resp.id,
                    payloads: Some(payloads.iter().map(WirePayload::from).collect()),
                    ..Default::default()
                },
                Err(failure) => WireCommand {
                    id: resp.id,
                    failure: Some(failure.clone()),
                    ..Default::default()
                },
            },
        }
    }
}

/// Why a wire command could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A request also carried a failure, or a response carried neither
    /// payloads nor failure.
    Malformed(String),
    /// A binary field was not valid base64.
    Base64(String),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed command: {}", msg),
            Self::Base64(msg) => write!(f, "invalid base64: {}", msg),
        }
    }
}

impl WireCommand {
    /// Validate and convert into the typed command model.
    pub fn into_command(self) -> Result<Command, WireError> {
        let decode_payloads = |payloads: Option<Vec<WirePayload>>| {
            payloads
                .unwrap_or_default()
                .into_iter()
                .map(|p| p.into_payload().map_err(|e| WireError::Base64(e.to_string())))
                .collect::<Result<Vec<_>, _>>()
        };

        match self.command {
            Some(name) => {
                if self.failure.is_some() {
                    return Err(WireError::Malformed(format!(
                        "request {} carries a failure",
                        self.id
                    )));
                }
                Ok(Command::Request(Request {
                    id: self.id,
                    name,
                    options: self.options.unwrap_or_default(),
                    payloads: decode_payloads(self.payloads)?,
                    header: self.header.unwrap_or_default(),
                }))
            }
            None => {
                if let Some(failure) = self.failure {
                    if self.payloads.is_some() {
                        return Err(WireError::Malformed(format!(
                            "response {} carries both payloads and failure",
                            self.id
                        )));
                    }
                    Ok(Command::Response(Response::failure(self.id, failure)))
                } else if self.payloads.is_some() {
                    Ok(Command::Response(Response {
                        id: self.id,
                        result: Ok(decode_payloads(self.payloads)?),
                    }))
                } else {
                    Err(WireError::Malformed(format!(
                        "command {} carries neither a name nor a result",
                        self.id
                    )))
                }
            }
        }
    }
}
