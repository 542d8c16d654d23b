// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Payload conversion.
//!
//! The converter marshals values into wire payloads and back. JSON is the
//! default; alternative converters plug in through [`DataConverter`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use weft_protocol::Payload;

/// Errors from payload conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported encoding: {0}")]
    Encoding(String),
}

/// Marshals values across the payload boundary.
pub trait DataConverter: Send + Sync {
    /// Encoding tag stamped into payload metadata.
    fn encoding(&self) -> &'static str;

    /// Encode a JSON value into a payload.
    fn to_payload(&self, value: &serde_json::Value) -> Result<Payload, ConvertError>;

    /// Decode a payload back into a JSON value.
    fn from_payload(&self, payload: &Payload) -> Result<serde_json::Value, ConvertError>;
}

/// Encode any serializable value through a converter.
pub fn to_payload<T: Serialize>(
    converter: &dyn DataConverter,
    value: &T,
) -> Result<Payload, ConvertError> {
    converter.to_payload(&serde_json::to_value(value)?)
}

/// Decode a payload into any deserializable value through a converter.
pub fn from_payload<T: DeserializeOwned>(
    converter: &dyn DataConverter,
    payload: &Payload,
) -> Result<T, ConvertError> {
    Ok(serde_json::from_value(converter.from_payload(payload)?)?)
}

/// The default converter: UTF-8 JSON bytes tagged `json/plain`.
#[derive(Debug, Default)]
pub struct JsonConverter;

impl DataConverter for JsonConverter {
    fn encoding(&self) -> &'static str {
        "json/plain"
    }

    fn to_payload(&self, value: &serde_json::Value) -> Result<Payload, ConvertError> {
        Ok(Payload::with_encoding(
            self.encoding(),
            serde_json::to_vec(value)?,
        ))
    }

    fn from_payload(&self, payload: &Payload) -> Result<serde_json::Value, ConvertError> {
        if let Some(encoding) = payload.metadata.get("encoding") {
            if encoding != self.encoding().as_bytes() {
                return Err(ConvertError::Encoding(
                    String::from_utf8_lossy(encoding).into_owned(),
                ));
            }
        }
        Ok(serde_json::from_slice(&payload.data)?)
    }
}
