//! Diagnostic output: severity-tagged sinks, a swappable hub, and the
//! redirect scope that captures parser output during ingestion.
//!
//! The hub is the shared, mutable diagnostic channel parsers write to.
//! `RedirectScope` is the only component that swaps the installed sink, and
//! restoration is tied to `Drop` so it happens on every exit path.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Destination for diagnostic text.
pub trait DiagnosticSink: Send + Sync {
    fn write(&self, severity: Severity, message: &str);
}

/// Sink that forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn write(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!("{}", message),
            Severity::Warn => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }
    }
}

/// In-memory sink for tests and log snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(Severity, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured entries.
    pub fn snapshot(&self) -> Vec<(Severity, String)> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of captured entries at the given severity.
    pub fn count_at(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == severity)
            .count()
    }

    /// Clear all captured entries.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn write(&self, severity: Severity, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}

/// The shared diagnostic channel parsers write to.
///
/// Holds exactly one installed sink at a time. Swapping goes through
/// [`RedirectScope`]; concurrent scopes over one hub would misattribute
/// output, so at most one is expected to be active at a time.
#[derive(Clone)]
pub struct DiagnosticHub {
    sink: Arc<Mutex<Arc<dyn DiagnosticSink>>>,
}

impl DiagnosticHub {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Write a line through the currently installed sink.
    pub fn write(&self, severity: Severity, message: &str) {
        // Clone the Arc out so the write itself runs outside the lock.
        let sink = self.lock().clone();
        sink.write(severity, message);
    }

    /// Install a sink, returning the previously installed one.
    pub fn install(&self, sink: Arc<dyn DiagnosticSink>) -> Arc<dyn DiagnosticSink> {
        std::mem::replace(&mut *self.lock(), sink)
    }

    /// Sink currently installed.
    pub fn current(&self) -> Arc<dyn DiagnosticSink> {
        self.lock().clone()
    }

    // Restore must still succeed while unwinding from a panicked scope body,
    // so recover the inner value if the mutex was poisoned.
    fn lock(&self) -> MutexGuard<'_, Arc<dyn DiagnosticSink>> {
        match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for DiagnosticHub {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

/// Scoped redirect of the hub's sink.
///
/// Construction captures the sink installed at that moment and installs the
/// replacement; dropping the scope restores the captured sink. The restore
/// runs on success, on error returns, and during unwinding alike.
pub struct RedirectScope<'a> {
    hub: &'a DiagnosticHub,
    previous: Option<Arc<dyn DiagnosticSink>>,
}

impl<'a> RedirectScope<'a> {
    pub fn new(hub: &'a DiagnosticHub, sink: Arc<dyn DiagnosticSink>) -> Self {
        let previous = hub.install(sink);
        Self {
            hub,
            previous: Some(previous),
        }
    }
}

impl Drop for RedirectScope<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.hub.install(previous);
        }
    }
}
