// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Weft Protocol - wire boundary for the weft worker runtime.
//!
//! This crate defines everything that crosses the host boundary:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      weft-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Command model: Request / Response, Payload, Failure        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Batch codecs: JSON (serde_json) / Protobuf (prost)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Host link: length-prefixed frames, HostConnection seam     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The codec is selected by the `RR_CODEC` environment entry: `protobuf`
//! picks the protobuf codec, any other value (including absent) picks
//! JSON. Both codecs preserve command order and produce deterministic
//! bytes for a given input, which is what makes replay comparisons
//! byte-exact.

pub mod codec;
pub mod command;
pub mod frame;
pub mod host;

pub use codec::{Codec, CodecError, CodecKind, JsonCodec, ProtoCodec};
pub use command::{
    Command, ErrorCode, Failure, Headers, JsonMap, Payload, Request, Response, ResponseResult,
    TASK_QUEUE_HEADER,
};
pub use frame::{Frame, FrameError, FrameType};
pub use host::{Batch, ChannelHost, FramedHost, HostConnection, HostError, HostHandle};
