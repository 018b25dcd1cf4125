//! beamcam - file ingestion and G-code generation core for a CAM workspace
//!
//! This crate contains the non-UI core of the workspace:
//! - Multi-format document ingestion (SVG/DXF/raster/raw) with per-file
//!   failure isolation
//! - Diagnostic redirection so parser output lands in the command log
//! - The single-flight, cancellable G-code generation job
//! - The workspace store the UI layer subscribes to
//!
//! The vector parsers, the raster decoder and the geometry-to-toolpath
//! generator are external collaborators plugged in through the seams in
//! [`parsers`] and [`gcode`].

pub mod classify;
pub mod diag;
pub mod document;
pub mod error;
pub mod gcode;
pub mod ingest;
pub mod parsers;
pub mod settings;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use classify::DocumentKind;
pub use document::{Bounds, Document, DocumentAttrs, DocumentPayload, IngestModifiers};
pub use error::{GenerateError, LoadError};
pub use gcode::{
    GcodeGenerator, GenerationReporter, GenerationRequest, GeometryCache, JobController,
    JobHandle, JobState, JobStatus, Operation, OperationKind,
};
pub use ingest::{BatchHandle, IngestionCoordinator, InputFile};
pub use settings::MachineSettings;
pub use store::{StoreEvent, WorkspaceStore};

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, RwLock};

use diag::{DiagnosticHub, DiagnosticSink};
use ingest::LoaderDeps;

/// External collaborators the workspace is wired with.
pub struct WorkspaceDeps {
    pub svg_parser: Arc<dyn parsers::SvgTagParser>,
    pub dxf_parser: Arc<dyn parsers::DxfTreeParser>,
    pub raster_decoder: Arc<dyn parsers::RasterDecoder>,
    pub generator: Arc<dyn GcodeGenerator>,
    /// Application command log; load failures, parser diagnostics and
    /// generator log lines land here.
    pub command_log: Arc<dyn DiagnosticSink>,
}

/// Top-level workspace state shared with the (out-of-scope) UI layer.
pub struct CamWorkspace {
    store: WorkspaceStore,
    diag: DiagnosticHub,
    settings: Arc<RwLock<MachineSettings>>,
    cache: GeometryCache,
    ingest: IngestionCoordinator,
    job: JobController,
    generator: Arc<dyn GcodeGenerator>,
    command_log: Arc<dyn DiagnosticSink>,
    current_job: Arc<RwLock<Option<JobHandle>>>,
}

impl CamWorkspace {
    /// Create a workspace.
    ///
    /// Returns the workspace and the store event stream the UI subscribes
    /// to.
    pub fn new(deps: WorkspaceDeps) -> (Self, mpsc::Receiver<StoreEvent>) {
        let (store, events) = WorkspaceStore::new();
        let diag = DiagnosticHub::default();

        let loader_deps = LoaderDeps {
            svg: deps.svg_parser,
            dxf: deps.dxf_parser,
            raster: deps.raster_decoder,
            diag: diag.clone(),
            command_log: deps.command_log.clone(),
        };
        let ingest = IngestionCoordinator::new(store.clone(), loader_deps);
        let job = JobController::new(store.clone());

        (
            Self {
                store,
                diag,
                settings: Arc::new(RwLock::new(MachineSettings::default())),
                cache: GeometryCache::new(),
                ingest,
                job,
                generator: deps.generator,
                command_log: deps.command_log,
                current_job: Arc::new(RwLock::new(None)),
            },
            events,
        )
    }

    /// Snapshot store for documents and generated output.
    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    /// Diagnostic hub parsers write to.
    pub fn diagnostics(&self) -> &DiagnosticHub {
        &self.diag
    }

    pub async fn settings(&self) -> MachineSettings {
        self.settings.read().await.clone()
    }

    pub async fn set_settings(&self, settings: MachineSettings) {
        *self.settings.write().await = settings;
    }

    /// Current generation job status.
    pub fn job_status(&self) -> JobStatus {
        self.job.status()
    }

    /// Ingest a batch of files.
    ///
    /// The modifiers in force at the moment of the call are captured into
    /// every document of the batch. Documents appear in the store as their
    /// loads complete; failures go to the command log.
    pub fn load_files(&self, files: Vec<InputFile>, modifiers: IngestModifiers) -> BatchHandle {
        self.ingest.load_files(files, modifiers)
    }

    /// Start a generation job over the current documents.
    ///
    /// The returned handle cancels this job; the workspace also keeps one
    /// for [`cancel_generation`](Self::cancel_generation).
    pub async fn start_generation(
        &self,
        operations: Vec<Operation>,
    ) -> Result<JobHandle, GenerateError> {
        let request = GenerationRequest {
            settings: self.settings.read().await.clone(),
            documents: self.store.documents().await,
            operations,
            cache: self.cache.clone(),
        };
        let handle = self
            .job
            .start(request, self.generator.clone(), self.command_log.clone())?;
        *self.current_job.write().await = Some(handle.clone());
        Ok(handle)
    }

    /// Cancel the running generation job, if any.
    pub async fn cancel_generation(&self) {
        if let Some(handle) = self.current_job.write().await.take() {
            handle.cancel().await;
        }
    }

    /// Read previously generated output from a file and publish it as the
    /// result, without invoking the generator.
    pub async fn load_generated_result_from_file(&self, path: &Path) -> anyhow::Result<()> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.store.apply(StoreEvent::GcodeSet { text }).await;
        Ok(())
    }

    /// Clear the generated output.
    pub async fn clear_generated_result(&self) {
        self.store
            .apply(StoreEvent::GcodeSet {
                text: String::new(),
            })
            .await;
    }
}
