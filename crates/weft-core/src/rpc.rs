// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Auxiliary RPC channel seam.
//!
//! Activity handlers and the workflow-service path use this synchronous
//! request/response capability. The tick thread serializes all use.

use thiserror::Error;

/// Errors from the RPC channel.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc unavailable: {0}")]
    Unavailable(String),

    #[error("rpc call failed: {0}")]
    Call(String),
}

/// Synchronous request/response RPC to the sidecar service.
pub trait RpcConnection: Send + Sync {
    /// Invoke `method` with an opaque body, returning the opaque reply.
    fn call(&self, method: &str, body: &[u8]) -> Result<Vec<u8>, RpcError>;
}

/// RPC connection for deployments without a sidecar RPC channel.
///
/// Every call answers [`RpcError::Unavailable`].
#[derive(Debug, Default)]
pub struct NoopRpc;

impl RpcConnection for NoopRpc {
    fn call(&self, method: &str, _body: &[u8]) -> Result<Vec<u8>, RpcError> {
        Err(RpcError::Unavailable(method.to_string()))
    }
}
