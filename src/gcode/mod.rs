//! G-code generation: the external generator seam and the job lifecycle.
//!
//! The geometry-to-toolpath algorithm itself is an external collaborator
//! behind [`GcodeGenerator`]; this module owns everything around one
//! invocation of it: the request, the progress/log channel it reports
//! through, and (in [`job`]) the single-flight lifecycle.

mod job;

pub use job::{JobController, JobHandle, JobState, JobStatus};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::diag::{DiagnosticSink, Severity};
use crate::document::Document;
use crate::settings::MachineSettings;

/// Kind of toolpath an operation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    LaserCut,
    LaserRaster,
    MillPocket,
    MillProfile,
}

/// A CAM operation applied to a set of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub kind: OperationKind,
    pub document_ids: Vec<String>,
    /// Operation parameters (power, passes, depth, ...) as loose key/value
    /// pairs; the generator interprets them.
    pub params: HashMap<String, f64>,
}

/// Per-document geometry cache handed through to the generator.
///
/// Generators may stash preprocessed geometry here between runs, keyed by
/// document id. The workspace owns one cache for its lifetime.
#[derive(Clone, Default)]
pub struct GeometryCache {
    inner: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, document_id: &str) -> Option<Bytes> {
        self.inner.read().await.get(document_id).cloned()
    }

    pub async fn put(&self, document_id: impl Into<String>, data: Bytes) {
        self.inner.write().await.insert(document_id.into(), data);
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

/// Everything one generation run consumes.
#[derive(Clone)]
pub struct GenerationRequest {
    pub settings: MachineSettings,
    pub documents: Vec<Document>,
    pub operations: Vec<Operation>,
    pub cache: GeometryCache,
}

/// Progress/log channel a generator reports through.
///
/// Progress values are forwarded verbatim, in call order, over a single
/// channel; nothing reorders or clamps them.
#[derive(Clone)]
pub struct GenerationReporter {
    pub(crate) progress_tx: mpsc::UnboundedSender<u8>,
    pub(crate) sink: Arc<dyn DiagnosticSink>,
}

impl GenerationReporter {
    /// Report percent complete.
    pub fn progress(&self, percent: u8) {
        let _ = self.progress_tx.send(percent);
    }

    /// Write a line to the application command log.
    pub fn log(&self, severity: Severity, message: &str) {
        self.sink.write(severity, message);
    }
}

/// The external geometry-to-toolpath function.
///
/// Invoked exactly once per job. Implementations should poll `cancel` and
/// stop reporting once it trips; the controller treats a cancel request as
/// terminal regardless of whether the generator acknowledges it.
#[async_trait]
pub trait GcodeGenerator: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
        reporter: GenerationReporter,
        cancel: CancellationToken,
    ) -> anyhow::Result<String>;
}
