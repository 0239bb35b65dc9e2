//! Debounced diagnostics publishing.
//!
//! Diagnostics arrive on every regeneration, which during typing means a
//! burst per keystroke. Work is coalesced per document path: each
//! enqueue supersedes the pending one and restarts the delay, so only
//! the newest diagnostics for a path reach the sink. Unlike the text
//! publisher, the per-document cache here *is* cleared when a document
//! closes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use weft_mapping::Diagnostic;
use weft_state::{ChangeEvent, ChangeKind, ChangeListener};

use crate::error::PublishResult;

/// Outbound diagnostics payload.
#[derive(Debug, Clone)]
pub struct DiagnosticsUpdate {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
    pub version: i32,
}

/// Destination for diagnostics notifications.
#[async_trait]
pub trait DiagnosticsSink: Send + Sync {
    async fn publish_diagnostics(&self, update: DiagnosticsUpdate) -> PublishResult<()>;
}

/// Debounces and publishes diagnostics per document path.
pub struct DiagnosticsPublisher {
    sink: Arc<dyn DiagnosticsSink>,
    delay: Duration,
    generations: Mutex<HashMap<PathBuf, u64>>,
    published: Mutex<HashMap<PathBuf, Vec<Diagnostic>>>,
    cancel: CancellationToken,
}

impl DiagnosticsPublisher {
    pub fn new(sink: Arc<dyn DiagnosticsSink>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            sink,
            delay,
            generations: Mutex::new(HashMap::new()),
            published: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Schedule diagnostics for `path`. Supersedes any pending work for
    /// the same path and restarts the delay.
    pub fn enqueue(self: &Arc<Self>, path: PathBuf, diagnostics: Vec<Diagnostic>, version: i32) {
        let generation = {
            let mut generations = self
                .generations
                .lock()
                .expect("diagnostics generations lock poisoned");
            let slot = generations.entry(path.clone()).or_insert(0);
            *slot += 1;
            *slot
        };

        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = this.cancel.cancelled() => {
                    // Abandoned without side effects.
                }
                _ = tokio::time::sleep(this.delay) => {
                    this.flush(path, diagnostics, version, generation).await;
                }
            }
        });
    }

    async fn flush(
        &self,
        path: PathBuf,
        diagnostics: Vec<Diagnostic>,
        version: i32,
        generation: u64,
    ) {
        {
            let generations = self
                .generations
                .lock()
                .expect("diagnostics generations lock poisoned");
            if generations.get(&path).copied() != Some(generation) {
                // Superseded or cleared while waiting.
                return;
            }
        }

        let unchanged = {
            let published = self
                .published
                .lock()
                .expect("diagnostics cache lock poisoned");
            published.get(&path) == Some(&diagnostics)
        };
        if unchanged {
            return;
        }

        let update = DiagnosticsUpdate {
            path: path.clone(),
            diagnostics: diagnostics.clone(),
            version,
        };
        match self.sink.publish_diagnostics(update).await {
            Ok(()) => {
                self.published
                    .lock()
                    .expect("diagnostics cache lock poisoned")
                    .insert(path, diagnostics);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "diagnostics publish failed");
            }
        }
    }

    /// Forget pending and published diagnostics for `path`.
    pub fn clear(&self, path: &Path) {
        self.generations
            .lock()
            .expect("diagnostics generations lock poisoned")
            .remove(path);
        self.published
            .lock()
            .expect("diagnostics cache lock poisoned")
            .remove(path);
    }

    /// Cancel all pending work. Further enqueues are ignored.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }
}

impl ChangeListener for DiagnosticsPublisher {
    fn on_change(&self, event: &ChangeEvent) {
        if event.kind == ChangeKind::DocumentClosed {
            if let Some(path) = event.document_path.as_deref() {
                self.clear(path);
            }
        }
    }
}
