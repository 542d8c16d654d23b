// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Core runtime error types.

use thiserror::Error;

use weft_protocol::{CodecError, ErrorCode, Failure, HostError};

use crate::convert::ConvertError;
use crate::rpc::RpcError;

/// Errors raised by the worker runtime.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Header missing or ill-typed, bad options.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Task queue, workflow type or activity type not registered.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation not valid for the execution's lifecycle state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Start for a workflow id that already has an execution.
    #[error("already started: {0}")]
    AlreadyStarted(String),

    /// Execution ended by cancellation.
    #[error("canceled: {0}")]
    Canceled(String),

    /// Execution ended by termination.
    #[error("terminated: {0}")]
    Terminated(String),

    /// Inbound response without a matching pending slot.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Request kind without a handler.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Batch could not be decoded or encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Host link failure.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Payload conversion failure.
    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),

    /// RPC channel failure.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
}

impl WorkerError {
    /// The wire code this error surfaces as.
    ///
    /// Lookup misses are surfaced as out-of-range failures.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound(_) => ErrorCode::OutOfRange,
            Self::IllegalState(_) => ErrorCode::IllegalState,
            Self::AlreadyStarted(_) => ErrorCode::AlreadyStarted,
            Self::Canceled(_) => ErrorCode::Canceled,
            Self::Terminated(_) => ErrorCode::Terminated,
            Self::Protocol(_) => ErrorCode::Protocol,
            Self::NotImplemented(_) => ErrorCode::NotImplemented,
            Self::Codec(_) | Self::Host(_) | Self::Convert(_) | Self::Rpc(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Map onto a wire failure.
    pub fn to_failure(&self) -> Failure {
        Failure::new(self.code(), self.to_string())
    }
}

/// Type alias for core results.
pub type Result<T> = std::result::Result<T, WorkerError>;
