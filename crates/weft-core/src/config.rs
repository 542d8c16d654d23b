// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker factory configuration.

use std::env;

use weft_protocol::CodecKind;

use crate::reader::ReaderMode;

/// Environment entry selecting the metadata reader mode.
pub const READER_MODE_ENV: &str = "WEFT_READER_MODE";

/// Configuration for a [`WorkerFactory`](crate::factory::WorkerFactory).
///
/// Codec choice is a first-class input; `from_env` honors the `RR_CODEC`
/// entry as a fallback for deployments that configure through the
/// environment.
#[derive(Debug, Clone, Default)]
pub struct FactoryConfig {
    /// Batch codec used on the host link.
    pub codec: CodecKind,
    /// How handler metadata is discovered.
    pub reader_mode: ReaderMode,
}

impl FactoryConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Environment variables:
    /// - `RR_CODEC`: `protobuf` selects the protobuf codec; any other
    ///   value (including absent) selects JSON.
    /// - `WEFT_READER_MODE`: `selective` engages the annotation fallback
    ///   reader; any other value keeps the attribute reader alone.
    pub fn from_env() -> Self {
        Self {
            codec: CodecKind::from_env(),
            reader_mode: env::var(READER_MODE_ENV)
                .map(|v| ReaderMode::parse(&v))
                .unwrap_or_default(),
        }
    }

    /// Use the given codec.
    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// Use the given reader mode.
    pub fn with_reader_mode(mut self, mode: ReaderMode) -> Self {
        self.reader_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FactoryConfig::default();
        assert_eq!(config.codec, CodecKind::Json);
        assert_eq!(config.reader_mode, ReaderMode::AttributesOnly);
    }

    #[test]
    fn test_with_codec() {
        let config = FactoryConfig::default().with_codec(CodecKind::Protobuf);
        assert_eq!(config.codec, CodecKind::Protobuf);
    }

    #[test]
    fn test_with_reader_mode() {
        let config = FactoryConfig::default().with_reader_mode(ReaderMode::Selective);
        assert_eq!(config.reader_mode, ReaderMode::Selective);
    }

    #[test]
    fn test_config_clone() {
        let config = FactoryConfig::default().with_codec(CodecKind::Protobuf);
        let cloned = config.clone();
        assert_eq!(config.codec, cloned.codec);
        assert_eq!(config.reader_mode, cloned.reader_mode);
    }
}
