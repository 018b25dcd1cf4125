//! Batch ingestion: concurrent per-file loads with isolated failures.
//!
//! Each file in a batch becomes its own tokio task. Every task publishes its
//! own outcome at its own completion time: a document-added store event per
//! success, a command-log entry per failure. No ordering is guaranteed
//! across files in a batch, one file's failure never touches its siblings,
//! and loads are not cancellable once started.

mod loader;

pub use loader::{load_file, InputFile, LoaderDeps};

use tokio::task::JoinSet;

use crate::diag::{DiagnosticSink, Severity};
use crate::document::IngestModifiers;
use crate::store::{StoreEvent, WorkspaceStore};

/// Fans a batch of files out to independent loads.
#[derive(Clone)]
pub struct IngestionCoordinator {
    store: WorkspaceStore,
    deps: LoaderDeps,
}

impl IngestionCoordinator {
    pub fn new(store: WorkspaceStore, deps: LoaderDeps) -> Self {
        Self { store, deps }
    }

    /// Start loading a batch.
    ///
    /// Spawns one task per file and returns immediately; documents appear in
    /// the store as their loads complete, in whatever order I/O produces.
    /// The shared `modifiers` are snapshotted into every document of the
    /// batch.
    pub fn load_files(&self, files: Vec<InputFile>, modifiers: IngestModifiers) -> BatchHandle {
        let mut tasks = JoinSet::new();
        tracing::info!(files = files.len(), "Ingestion batch started");

        for file in files {
            let store = self.store.clone();
            let deps = self.deps.clone();
            let modifiers = modifiers.clone();

            tasks.spawn(async move {
                match loader::load_file(&file, &modifiers, &deps).await {
                    Ok(document) => {
                        tracing::debug!(
                            name = %document.source_name,
                            kind = %document.kind,
                            bytes = document.size_bytes,
                            "Document loaded"
                        );
                        store.apply(StoreEvent::DocumentLoaded { document }).await;
                    }
                    Err(e) => {
                        // Recovered locally: log it and skip this file.
                        tracing::error!(name = %e.file_name(), error = %e, "Load failed");
                        deps.command_log.write(Severity::Error, &e.to_string());
                    }
                }
            });
        }

        BatchHandle { tasks }
    }
}

/// Awaitable handle over one batch's tasks.
///
/// Publication does not wait on this; it exists so callers can await
/// quiescence (tests, shutdown). There is no cancel path for a batch.
pub struct BatchHandle {
    tasks: JoinSet<()>,
}

impl BatchHandle {
    /// Wait for every load in the batch to finish.
    pub async fn join(mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    /// Loads still outstanding.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Severity;
    use crate::testutil::{stub_deps, write_file};

    #[tokio::test]
    async fn batch_publishes_each_success_and_logs_each_failure() {
        let dir = tempfile::tempdir().unwrap();
        let good_a = write_file(&dir, "a.svg", "<svg>a</svg>");
        let bad = write_file(&dir, "b.svg", "<svg broken");
        let good_c = write_file(&dir, "c.dxf", "entities");

        let (store, _events) = WorkspaceStore::new();
        let (deps, log) = stub_deps();
        let coordinator = IngestionCoordinator::new(store.clone(), deps);

        coordinator
            .load_files(
                vec![
                    InputFile::new(good_a, "image/svg+xml"),
                    InputFile::new(bad, "image/svg+xml"),
                    InputFile::new(good_c, ""),
                ],
                IngestModifiers::new(),
            )
            .join()
            .await;

        // Exactly two documents and one logged failure, whatever the
        // completion order was.
        assert_eq!(store.document_count().await, 2);
        assert_eq!(log.count_at(Severity::Error), 1);
        let names: Vec<String> = store
            .documents()
            .await
            .into_iter()
            .map(|d| d.source_name)
            .collect();
        assert!(names.contains(&"a.svg".to_string()));
        assert!(names.contains(&"c.dxf".to_string()));
    }

    #[tokio::test]
    async fn one_io_failure_does_not_disturb_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(&dir, "keep.bin", "data");

        let (store, _events) = WorkspaceStore::new();
        let (deps, log) = stub_deps();
        let coordinator = IngestionCoordinator::new(store.clone(), deps);

        coordinator
            .load_files(
                vec![
                    InputFile::new("/nonexistent/gone.bin", ""),
                    InputFile::new(good, ""),
                ],
                IngestModifiers::new(),
            )
            .join()
            .await;

        assert_eq!(store.document_count().await, 1);
        assert_eq!(log.count_at(Severity::Error), 1);
    }

    #[tokio::test]
    async fn store_event_emitted_per_completion_not_batched() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(&dir, "a.bin", "x");
        let b = write_file(&dir, "b.bin", "y");

        let (store, mut events) = WorkspaceStore::new();
        let (deps, _log) = stub_deps();
        let coordinator = IngestionCoordinator::new(store.clone(), deps);

        coordinator
            .load_files(
                vec![InputFile::new(a, ""), InputFile::new(b, "")],
                IngestModifiers::new(),
            )
            .join()
            .await;

        let mut seen = 0;
        while let Ok(event) = events.try_recv() {
            assert!(matches!(event, StoreEvent::DocumentLoaded { .. }));
            seen += 1;
        }
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn empty_batch_joins_immediately() {
        let (store, _events) = WorkspaceStore::new();
        let (deps, _log) = stub_deps();
        let coordinator = IngestionCoordinator::new(store, deps);

        let handle = coordinator.load_files(Vec::new(), IngestModifiers::new());
        assert!(handle.is_empty());
        handle.join().await;
    }
}
