// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handler metadata discovery.
//!
//! A declaration carries what the user said about a handler type;
//! readers turn that into the runtime's view of it. The attribute source
//! is preferred; the selective reader additionally falls back to legacy
//! annotation metadata when no attributes are present. Reserved names
//! are suppressed from signal/query inventories at the reader level so
//! they never collide with type-system keywords.

use serde::{Deserialize, Serialize};

/// Names ignored by every reader.
pub const RESERVED_NAMES: &[&str] = &["readonly"];

/// Named handler with its signal/query inventories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerInfo {
    /// Registered type name.
    pub name: String,
    /// Signal handler names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<String>,
    /// Query handler names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,
}

impl HandlerInfo {
    /// Info with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a signal name.
    pub fn with_signal(mut self, name: impl Into<String>) -> Self {
        self.signals.push(name.into());
        self
    }

    /// Add a query name.
    pub fn with_query(mut self, name: impl Into<String>) -> Self {
        self.queries.push(name.into());
        self
    }
}

/// What the user declared about a handler type.
#[derive(Debug, Clone, Default)]
pub struct HandlerDeclaration {
    /// The declared type's name, used when no metadata names it.
    pub type_name: String,
    /// Attribute metadata (preferred source).
    pub attributes: Option<HandlerInfo>,
    /// Legacy annotation metadata (fallback source).
    pub annotations: Option<HandlerInfo>,
}

impl HandlerDeclaration {
    /// Declaration with only a type name.
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// Attach attribute metadata.
    pub fn with_attributes(mut self, info: HandlerInfo) -> Self {
        self.attributes = Some(info);
        self
    }

    /// Attach legacy annotation metadata.
    pub fn with_annotations(mut self, info: HandlerInfo) -> Self {
        self.annotations = Some(info);
        self
    }
}

/// Maps a declared type to its named handlers.
pub trait MetadataReader: Send + Sync {
    fn read(&self, declared: &HandlerDeclaration) -> HandlerInfo;
}

fn suppress_reserved(mut info: HandlerInfo) -> HandlerInfo {
    info.signals.retain(|s| !RESERVED_NAMES.contains(&s.as_str()));
    info.queries.retain(|q| !RESERVED_NAMES.contains(&q.as_str()));
    info
}

fn fallback_info(declared: &HandlerDeclaration) -> HandlerInfo {
    HandlerInfo::named(declared.type_name.clone())
}

/// Reads attribute metadata; the declared type name is the fallback.
#[derive(Debug, Default)]
pub struct AttributeReader;

impl MetadataReader for AttributeReader {
    fn read(&self, declared: &HandlerDeclaration) -> HandlerInfo {
        suppress_reserved(
            declared
                .attributes
                .clone()
                .unwrap_or_else(|| fallback_info(declared)),
        )
    }
}

/// Prefers attribute metadata, falls back to legacy annotations.
#[derive(Debug, Default)]
pub struct SelectiveReader;

impl MetadataReader for SelectiveReader {
    fn read(&self, declared: &HandlerDeclaration) -> HandlerInfo {
        suppress_reserved(
            declared
                .attributes
                .clone()
                .or_else(|| declared.annotations.clone())
                .unwrap_or_else(|| fallback_info(declared)),
        )
    }
}

/// How handler metadata is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReaderMode {
    /// Attribute metadata only (the default).
    #[default]
    AttributesOnly,
    /// Attributes preferred, legacy annotations as fallback.
    Selective,
}

impl ReaderMode {
    /// Parse a configuration value; unknown values keep the default.
    pub fn parse(value: &str) -> Self {
        match value {
            "selective" => Self::Selective,
            _ => Self::AttributesOnly,
        }
    }

    /// Build the reader for this mode.
    pub fn reader(&self) -> Box<dyn MetadataReader> {
        match self {
            Self::AttributesOnly => Box::new(AttributeReader),
            Self::Selective => Box::new(SelectiveReader),
        }
    }
}
