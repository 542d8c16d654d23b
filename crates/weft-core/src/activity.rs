// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity invocation.
//!
//! Activities are side-effectful and non-replayed: they run once at
//! dispatch and their result is answered on the same tick.

use std::sync::Arc;

use weft_protocol::{Failure, Headers, Payload};

use crate::convert::DataConverter;
use crate::rpc::RpcConnection;

/// What an activity sees while executing.
pub struct ActivityContext<'a> {
    header: &'a Headers,
    converter: &'a dyn DataConverter,
    rpc: &'a dyn RpcConnection,
}

impl<'a> ActivityContext<'a> {
    pub(crate) fn new(
        header: &'a Headers,
        converter: &'a dyn DataConverter,
        rpc: &'a dyn RpcConnection,
    ) -> Self {
        Self {
            header,
            converter,
            rpc,
        }
    }

    pub fn header(&self) -> &Headers {
        self.header
    }

    pub fn converter(&self) -> &dyn DataConverter {
        self.converter
    }

    /// The workflow-service RPC channel.
    pub fn rpc(&self) -> &dyn RpcConnection {
        self.rpc
    }
}

/// A side-effectful operation invoked by workflows.
pub trait Activity: Send + Sync {
    fn execute(
        &self,
        ctx: &ActivityContext<'_>,
        args: Vec<Payload>,
    ) -> Result<Vec<Payload>, Failure>;
}

/// Adapter turning a plain function into an [`Activity`].
pub struct FnActivity<F>(pub F);

impl<F> Activity for FnActivity<F>
where
    F: Fn(&ActivityContext<'_>, Vec<Payload>) -> Result<Vec<Payload>, Failure> + Send + Sync,
{
    fn execute(
        &self,
        ctx: &ActivityContext<'_>,
        args: Vec<Payload>,
    ) -> Result<Vec<Payload>, Failure> {
        (self.0)(ctx, args)
    }
}

/// Box a function as a shareable activity handler.
pub fn activity_fn<F>(f: F) -> Arc<dyn Activity>
where
    F: Fn(&ActivityContext<'_>, Vec<Payload>) -> Result<Vec<Payload>, Failure>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnActivity(f))
}
