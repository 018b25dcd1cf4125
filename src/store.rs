//! Workspace state and the event channel that mutates it.
//!
//! The store has a single logical writer: components publish a `StoreEvent`,
//! `WorkspaceStore::apply` folds it into the snapshot, and the event is then
//! forwarded to listeners (the UI layer). Events are applied one at a time
//! behind the write lock, at each publisher's own completion time, never
//! batched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use crate::document::{Document, DocumentAttrs};

/// Generation activity as observed while a job runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcodingState {
    pub enabled: bool,
    /// Last reported percent, stored verbatim (not clamped or forced
    /// monotonic).
    pub percent: u8,
}

/// Generated-output state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcodeState {
    pub content: String,
    /// Set when documents change after the last generation, cleared when new
    /// output is published.
    pub dirty: bool,
    pub gcoding: GcodingState,
}

/// Events accepted by the store.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A file finished loading; its document is published.
    DocumentLoaded { document: Document },
    /// Generated output replaced.
    GcodeSet { text: String },
    /// Generation running flag and/or progress changed.
    GeneratingGcode { enabled: bool, percent: Option<u8> },
    /// Mutable attributes updated for one document.
    DocumentAttrsSet { id: String, attrs: DocumentAttrs },
}

#[derive(Debug, Default)]
struct StoreState {
    documents: Vec<Document>,
    gcode: GcodeState,
}

/// Snapshot store for documents and generated output.
#[derive(Clone)]
pub struct WorkspaceStore {
    inner: Arc<RwLock<StoreState>>,
    notify_tx: mpsc::Sender<StoreEvent>,
}

impl WorkspaceStore {
    /// Create a store and the event stream listeners consume.
    pub fn new() -> (Self, mpsc::Receiver<StoreEvent>) {
        let (notify_tx, notify_rx) = mpsc::channel(256);
        (
            Self {
                inner: Arc::new(RwLock::new(StoreState::default())),
                notify_tx,
            },
            notify_rx,
        )
    }

    /// Apply an event to the snapshot and notify listeners.
    pub async fn apply(&self, event: StoreEvent) {
        let mut state = self.inner.write().await;
        match &event {
            StoreEvent::DocumentLoaded { document } => {
                state.documents.push(document.clone());
                state.gcode.dirty = true;
            }
            StoreEvent::GcodeSet { text } => {
                state.gcode.content = text.clone();
                state.gcode.dirty = false;
            }
            StoreEvent::GeneratingGcode { enabled, percent } => {
                state.gcode.gcoding.enabled = *enabled;
                if let Some(percent) = percent {
                    state.gcode.gcoding.percent = *percent;
                }
            }
            StoreEvent::DocumentAttrsSet { id, attrs } => {
                if let Some(doc) = state.documents.iter_mut().find(|d| d.id == *id) {
                    doc.attrs = attrs.clone();
                } else {
                    tracing::warn!(id = %id, "Attrs update for unknown document");
                }
            }
        }
        drop(state);

        // Listeners that fall behind miss events, not state; the snapshot
        // accessors stay authoritative.
        let _ = self.notify_tx.try_send(event);
    }

    /// All published documents, in publication order.
    pub async fn documents(&self) -> Vec<Document> {
        self.inner.read().await.documents.clone()
    }

    /// One document by id.
    pub async fn document(&self, id: &str) -> Option<Document> {
        self.inner
            .read()
            .await
            .documents
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    pub async fn document_count(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    /// Current generated-output state.
    pub async fn gcode(&self) -> GcodeState {
        self.inner.read().await.gcode.clone()
    }
}
