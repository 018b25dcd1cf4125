//! Normalized document model produced by ingestion.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::DocumentKind;
use crate::parsers::{VectorTags, VectorTree};

/// Ingestion-time flags captured when a batch is requested
/// (e.g. append vs. replace). Immutable per document afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestModifiers(HashMap<String, bool>);

impl IngestModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style flag setter.
    pub fn with(mut self, key: impl Into<String>, value: bool) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Flag value; unset flags read as `false`.
    pub fn get(&self, key: &str) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }
}

/// Axis-aligned bounds in document units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Per-document attributes that may change after publication.
///
/// Updated exclusively through `StoreEvent::DocumentAttrsSet`. `bounds` is
/// the cache slot filled in once by the external bounds collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentAttrs {
    pub expanded: bool,
    pub bounds: Option<Bounds>,
}

/// Parsed content of an ingested file.
#[derive(Debug, Clone)]
pub enum DocumentPayload {
    /// Parsed SVG tag structure.
    VectorTags(VectorTags),
    /// Parsed DXF entity tree.
    VectorTree(VectorTree),
    /// Raw resource plus its decoded image.
    Raster {
        data: Bytes,
        image: Arc<DynamicImage>,
    },
    /// Raw resource, passed through unparsed.
    Raw(Bytes),
}

/// One ingested source file, normalized.
///
/// Created by ingestion on successful parse, published to the store, and
/// never mutated by the ingestion subsystem afterwards (only `attrs` changes,
/// through the store). Serializes as its metadata only; the parsed payload
/// stays in-process.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub source_name: String,
    /// Declared media type of the source file.
    pub source_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub kind: DocumentKind,
    #[serde(skip)]
    pub payload: DocumentPayload,
    pub modifiers: IngestModifiers,
    pub attrs: DocumentAttrs,
}

impl Document {
    pub fn new(
        source_name: impl Into<String>,
        source_type: impl Into<String>,
        size_bytes: u64,
        kind: DocumentKind,
        payload: DocumentPayload,
        modifiers: IngestModifiers,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_name: source_name.into(),
            source_type: source_type.into(),
            size_bytes,
            created_at: Utc::now(),
            kind,
            payload,
            modifiers,
            attrs: DocumentAttrs::default(),
        }
    }
}
