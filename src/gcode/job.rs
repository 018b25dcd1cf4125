//! Generation job lifecycle: single-flight start, progress, completion,
//! cancellation.
//!
//! State transitions are driven by the generator's reports and by the cancel
//! handle, nothing else. The controller enforces single-flight at `start`;
//! the cancellation race stays last-write-wins: a generator that completes
//! after a cancel request overwrites the Cancelled state and publishes its
//! result.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::diag::{DiagnosticSink, Severity};
use crate::error::GenerateError;
use crate::store::{StoreEvent, WorkspaceStore};

use super::{GcodeGenerator, GenerationReporter, GenerationRequest};

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Cancelled,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Cancelled | JobState::Completed | JobState::Failed
        )
    }
}

/// Snapshot of the tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    /// Last percent the generator reported, verbatim.
    pub percent: u8,
}

impl JobStatus {
    fn idle() -> Self {
        Self {
            state: JobState::Idle,
            percent: 0,
        }
    }
}

/// Owns the single-flight generation job.
pub struct JobController {
    store: WorkspaceStore,
    status_tx: Arc<watch::Sender<JobStatus>>,
}

impl JobController {
    pub fn new(store: WorkspaceStore) -> Self {
        let (status_tx, _) = watch::channel(JobStatus::idle());
        Self {
            store,
            status_tx: Arc::new(status_tx),
        }
    }

    /// Current job status.
    pub fn status(&self) -> JobStatus {
        *self.status_tx.borrow()
    }

    /// Watch job status changes.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    /// Start a generation job.
    ///
    /// Fails fast if the settings do not validate or a job is already
    /// Running. Invokes the generator exactly once; its progress reports are
    /// applied to the store in emission order, and completion publishes the
    /// result text. The returned handle is the only way to request early
    /// termination.
    pub fn start(
        &self,
        request: GenerationRequest,
        generator: Arc<dyn GcodeGenerator>,
        log: Arc<dyn DiagnosticSink>,
    ) -> Result<JobHandle, GenerateError> {
        let report = request.settings.validate();
        if !report.is_valid() {
            return Err(GenerateError::InvalidSettings {
                problems: report.problems,
            });
        }

        // Atomic check-and-set keeps the job single-flight.
        let started = self.status_tx.send_if_modified(|status| {
            if status.state.is_running() {
                false
            } else {
                *status = JobStatus {
                    state: JobState::Running,
                    percent: 0,
                };
                true
            }
        });
        if !started {
            return Err(GenerateError::JobAlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<u8>();
        let reporter = GenerationReporter {
            progress_tx,
            sink: log.clone(),
        };

        // Progress pump: one channel, applied in emission order.
        let pump_store = self.store.clone();
        let pump_status = self.status_tx.clone();
        let pump = tokio::spawn(async move {
            while let Some(percent) = progress_rx.recv().await {
                pump_status.send_modify(|status| status.percent = percent);
                pump_store
                    .apply(StoreEvent::GeneratingGcode {
                        enabled: true,
                        percent: Some(percent),
                    })
                    .await;
            }
        });

        let store = self.store.clone();
        let status_tx = self.status_tx.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            tracing::info!(
                documents = request.documents.len(),
                operations = request.operations.len(),
                "Gcode generation started"
            );

            let result = generator.generate(request, reporter, token.clone()).await;

            // The reporter dropped with the generator call, closing the
            // progress channel; draining the pump keeps progress ahead of
            // the completion events.
            let _ = pump.await;

            match result {
                Ok(text) => {
                    store
                        .apply(StoreEvent::GeneratingGcode {
                            enabled: false,
                            percent: None,
                        })
                        .await;
                    store.apply(StoreEvent::GcodeSet { text: text.clone() }).await;
                    status_tx.send_modify(|status| status.state = JobState::Completed);
                    tracing::info!(bytes = text.len(), "Gcode generation completed");
                }
                Err(e) if token.is_cancelled() => {
                    // Cancel already transitioned the state; the generator
                    // winding down is not a failure. A progress report still
                    // queued at cancel time re-enabled the store flag during
                    // the drain, so clear it again now that the drain is done.
                    store
                        .apply(StoreEvent::GeneratingGcode {
                            enabled: false,
                            percent: None,
                        })
                        .await;
                    tracing::debug!(error = %e, "Generator stopped after cancel request");
                }
                Err(e) => {
                    store
                        .apply(StoreEvent::GeneratingGcode {
                            enabled: false,
                            percent: None,
                        })
                        .await;
                    log.write(Severity::Error, &format!("G-code generation failed: {e}"));
                    status_tx.send_modify(|status| status.state = JobState::Failed);
                    tracing::error!(error = %e, "Gcode generation failed");
                }
            }
        });

        Ok(JobHandle {
            cancel,
            status_tx: self.status_tx.clone(),
            status_rx: self.status_tx.subscribe(),
            store: self.store.clone(),
        })
    }
}

/// Cancel capability for one job, returned from `start` and owned by the
/// caller.
#[derive(Clone)]
pub struct JobHandle {
    cancel: CancellationToken,
    status_tx: Arc<watch::Sender<JobStatus>>,
    status_rx: watch::Receiver<JobStatus>,
    store: WorkspaceStore,
}

impl JobHandle {
    /// Request early termination.
    ///
    /// Optimistic: the tracked state flips to Cancelled immediately, without
    /// waiting for the generator to acknowledge the token. A generator that
    /// completes anyway overwrites it.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        let transitioned = self.status_tx.send_if_modified(|status| {
            if status.state.is_running() {
                status.state = JobState::Cancelled;
                true
            } else {
                false
            }
        });
        if transitioned {
            self.store
                .apply(StoreEvent::GeneratingGcode {
                    enabled: false,
                    percent: None,
                })
                .await;
            tracing::info!("Gcode generation cancelled");
        }
    }

    /// Current job status.
    pub fn status(&self) -> JobStatus {
        *self.status_rx.borrow()
    }

    /// Watch job status changes.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    /// Wait until the job reaches a terminal state and return it.
    pub async fn wait_terminal(&mut self) -> JobStatus {
        loop {
            let status = *self.status_rx.borrow_and_update();
            if status.state.is_terminal() {
                return status;
            }
            if self.status_rx.changed().await.is_err() {
                return *self.status_rx.borrow();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::MemorySink;
    use crate::gcode::GeometryCache;
    use crate::settings::MachineSettings;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn request() -> GenerationRequest {
        GenerationRequest {
            settings: MachineSettings::default(),
            documents: Vec::new(),
            operations: Vec::new(),
            cache: GeometryCache::new(),
        }
    }

    /// Emits a fixed progress sequence, then completes.
    struct ScriptedGenerator {
        steps: Vec<u8>,
        result: String,
    }

    #[async_trait]
    impl GcodeGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            _request: GenerationRequest,
            reporter: GenerationReporter,
            _cancel: CancellationToken,
        ) -> anyhow::Result<String> {
            for percent in &self.steps {
                reporter.progress(*percent);
            }
            Ok(self.result.clone())
        }
    }

    /// Runs until cancelled, then stops with an error.
    struct WaitCancelGenerator;

    #[async_trait]
    impl GcodeGenerator for WaitCancelGenerator {
        async fn generate(
            &self,
            _request: GenerationRequest,
            _reporter: GenerationReporter,
            cancel: CancellationToken,
        ) -> anyhow::Result<String> {
            cancel.cancelled().await;
            Err(anyhow::anyhow!("generator stopped"))
        }
    }

    /// Reports one progress step, then runs until cancelled.
    struct ReportThenWaitGenerator;

    #[async_trait]
    impl GcodeGenerator for ReportThenWaitGenerator {
        async fn generate(
            &self,
            _request: GenerationRequest,
            reporter: GenerationReporter,
            cancel: CancellationToken,
        ) -> anyhow::Result<String> {
            reporter.progress(50);
            cancel.cancelled().await;
            Err(anyhow::anyhow!("generator stopped"))
        }
    }

    /// Ignores the cancel token; completes when released.
    struct GatedGenerator {
        release: Arc<Notify>,
        result: String,
    }

    #[async_trait]
    impl GcodeGenerator for GatedGenerator {
        async fn generate(
            &self,
            _request: GenerationRequest,
            _reporter: GenerationReporter,
            _cancel: CancellationToken,
        ) -> anyhow::Result<String> {
            self.release.notified().await;
            Ok(self.result.clone())
        }
    }

    /// Fails outright.
    struct FailingGenerator;

    #[async_trait]
    impl GcodeGenerator for FailingGenerator {
        async fn generate(
            &self,
            _request: GenerationRequest,
            _reporter: GenerationReporter,
            _cancel: CancellationToken,
        ) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("no toolpath for empty geometry"))
        }
    }

    #[tokio::test]
    async fn completes_and_publishes_result() {
        let (store, _events) = WorkspaceStore::new();
        let controller = JobController::new(store.clone());
        let log = Arc::new(MemorySink::new());

        let mut handle = controller
            .start(
                request(),
                Arc::new(ScriptedGenerator {
                    steps: vec![40, 90],
                    result: "G21\nG0 X0 Y0\n".to_string(),
                }),
                log,
            )
            .unwrap();

        let status = handle.wait_terminal().await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.percent, 90);

        let gcode = store.gcode().await;
        assert_eq!(gcode.content, "G21\nG0 X0 Y0\n");
        assert!(!gcode.gcoding.enabled);
    }

    #[tokio::test]
    async fn progress_applies_in_order_and_is_not_clamped() {
        let (store, mut events) = WorkspaceStore::new();
        let controller = JobController::new(store.clone());

        let mut handle = controller
            .start(
                request(),
                // A descending report is stored as given; the controller
                // does not clamp or enforce monotonicity.
                Arc::new(ScriptedGenerator {
                    steps: vec![90, 40],
                    result: String::new(),
                }),
                Arc::new(MemorySink::new()),
            )
            .unwrap();

        let status = handle.wait_terminal().await;
        assert_eq!(status.percent, 40);

        let mut percents = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let StoreEvent::GeneratingGcode {
                enabled: true,
                percent: Some(p),
            } = event
            {
                percents.push(p);
            }
        }
        assert_eq!(percents, vec![90, 40]);
    }

    #[tokio::test]
    async fn cancel_before_any_progress_transitions_to_cancelled() {
        let (store, _events) = WorkspaceStore::new();
        let controller = JobController::new(store.clone());

        let handle = controller
            .start(
                request(),
                Arc::new(WaitCancelGenerator),
                Arc::new(MemorySink::new()),
            )
            .unwrap();

        handle.cancel().await;
        assert_eq!(handle.status().state, JobState::Cancelled);

        // The generator stops with an error after the cancel request; that
        // must not flip the state to Failed.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.status().state, JobState::Cancelled);
        assert!(!store.gcode().await.gcoding.enabled);
    }

    #[tokio::test]
    async fn progress_queued_at_cancel_does_not_leave_gcoding_enabled() {
        let (store, _events) = WorkspaceStore::new();
        let controller = JobController::new(store.clone());

        let handle = controller
            .start(
                request(),
                Arc::new(ReportThenWaitGenerator),
                Arc::new(MemorySink::new()),
            )
            .unwrap();

        // On the current-thread runtime the 50% report is still sitting in
        // the pump channel when cancel clears the enabled flag; draining it
        // afterwards must not leave the flag set.
        handle.cancel().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.status().state, JobState::Cancelled);
        assert!(!store.gcode().await.gcoding.enabled);
    }

    #[tokio::test]
    async fn late_completion_after_cancel_wins() {
        // Chosen policy: last write wins. A generator that never honors the
        // token still gets its completion applied.
        let (store, _events) = WorkspaceStore::new();
        let controller = JobController::new(store.clone());
        let release = Arc::new(Notify::new());

        let handle = controller
            .start(
                request(),
                Arc::new(GatedGenerator {
                    release: release.clone(),
                    result: "LATE".to_string(),
                }),
                Arc::new(MemorySink::new()),
            )
            .unwrap();

        handle.cancel().await;
        assert_eq!(handle.status().state, JobState::Cancelled);

        release.notify_one();
        let mut rx = handle.subscribe();
        let status = rx
            .wait_for(|s| s.state == JobState::Completed)
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(store.gcode().await.content, "LATE");
    }

    #[tokio::test]
    async fn second_start_while_running_is_rejected() {
        let (store, _events) = WorkspaceStore::new();
        let controller = JobController::new(store.clone());
        let log: Arc<MemorySink> = Arc::new(MemorySink::new());

        let handle = controller
            .start(request(), Arc::new(WaitCancelGenerator), log.clone())
            .unwrap();

        let second = controller.start(request(), Arc::new(WaitCancelGenerator), log.clone());
        assert!(matches!(second, Err(GenerateError::JobAlreadyRunning)));

        // After the first job leaves Running, a new start is accepted.
        handle.cancel().await;
        let third = controller.start(request(), Arc::new(WaitCancelGenerator), log);
        assert!(third.is_ok());
        third.unwrap().cancel().await;
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected_before_the_generator_runs() {
        let (store, _events) = WorkspaceStore::new();
        let controller = JobController::new(store);

        let mut bad = request();
        bad.settings.machine_width_mm = 0.0;

        let result = controller.start(
            bad,
            Arc::new(FailingGenerator),
            Arc::new(MemorySink::new()),
        );
        assert!(matches!(
            result,
            Err(GenerateError::InvalidSettings { .. })
        ));
        assert_eq!(controller.status().state, JobState::Idle);
    }

    #[tokio::test]
    async fn generator_error_marks_failed_and_publishes_nothing() {
        let (store, _events) = WorkspaceStore::new();
        let controller = JobController::new(store.clone());
        let log = Arc::new(MemorySink::new());

        let mut handle = controller
            .start(request(), Arc::new(FailingGenerator), log.clone())
            .unwrap();

        let status = handle.wait_terminal().await;
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(store.gcode().await.content, "");
        assert_eq!(log.count_at(Severity::Error), 1);
    }

    #[test]
    fn job_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobState::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
