//! The project system: one façade over the state machine, version
//! cache, projection compiler, and publishers.
//!
//! Editor and build events enter here, get applied through the state
//! machine's serialized dispatcher, and fan out: the version cache and
//! diagnostics publisher listen to the machine directly, while
//! regeneration and text publishing are driven explicitly after each
//! content-bearing event.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use weft_mapping::Diagnostic;
use weft_publish::{DiagnosticsPublisher, DiagnosticsSink, GeneratedTextPublisher, NotificationChannel};
use weft_state::{
    DocumentSnapshot, DocumentVersionCache, FileKind, FileTextLoader, HostDocument, ListenerId,
    ProjectKey, ProjectState, StateEvent, StateMachine, WorkspaceSnapshot,
};

use crate::compiler::{CompileInput, ProjectionCompiler};
use crate::descriptor::ProjectDescriptor;
use crate::watcher::{coalesce_changes, FileChange, FileChangeKind};

/// Top-level coordinator for one workspace.
pub struct ProjectSystem {
    machine: StateMachine,
    versions: Arc<DocumentVersionCache>,
    compiler: Arc<dyn ProjectionCompiler>,
    publisher: Arc<GeneratedTextPublisher>,
    diagnostics: Arc<DiagnosticsPublisher>,
    // One token per path; a new regeneration supersedes the in-flight
    // one. The generation tag lets a completed regeneration clear only
    // its own entry.
    inflight: Mutex<HashMap<PathBuf, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
    listener_ids: Vec<ListenerId>,
    cancel: CancellationToken,
}

impl ProjectSystem {
    /// Wire up a system. Must be called within a tokio runtime; the
    /// version cache and diagnostics publisher are registered as state
    /// machine listeners before any event can be applied.
    pub async fn new(
        compiler: Arc<dyn ProjectionCompiler>,
        channel: Arc<dyn NotificationChannel>,
        sink: Arc<dyn DiagnosticsSink>,
        diagnostics_delay: Duration,
    ) -> anyhow::Result<Arc<Self>> {
        let machine = StateMachine::new();
        let versions = DocumentVersionCache::new();
        let diagnostics = DiagnosticsPublisher::new(sink, diagnostics_delay);

        let mut listener_ids = Vec::new();
        listener_ids.push(
            machine
                .add_listener(versions.clone())
                .await
                .context("registering version cache listener")?,
        );
        listener_ids.push(
            machine
                .add_listener(diagnostics.clone())
                .await
                .context("registering diagnostics listener")?,
        );

        Ok(Arc::new(Self {
            machine,
            versions,
            compiler,
            publisher: GeneratedTextPublisher::new(channel),
            diagnostics,
            inflight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            listener_ids,
            cancel: CancellationToken::new(),
        }))
    }

    pub fn snapshot(&self) -> Arc<WorkspaceSnapshot> {
        self.machine.snapshot()
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn versions(&self) -> &Arc<DocumentVersionCache> {
        &self.versions
    }

    /// Apply a freshly loaded project descriptor: adds the project on
    /// first sight, then synchronizes configuration, tags, and the
    /// declared document set. Documents already known are left alone.
    pub async fn apply_descriptor(
        &self,
        key: ProjectKey,
        descriptor: &ProjectDescriptor,
    ) -> anyhow::Result<()> {
        if self.snapshot().project(&key).is_none() {
            self.machine
                .apply(StateEvent::ProjectAdded {
                    key: key.clone(),
                    file_path: descriptor.project_file_path.clone(),
                    configuration: descriptor.configuration(),
                })
                .await?;
        }

        self.machine
            .apply(StateEvent::ProjectConfigurationChanged {
                key: key.clone(),
                configuration: descriptor.configuration(),
                tags: descriptor.tag_descriptors(),
            })
            .await?;

        for document in &descriptor.documents {
            self.machine
                .apply(StateEvent::DocumentAdded {
                    key: key.clone(),
                    host: HostDocument::new(
                        document.file_path.clone(),
                        document.target_path.clone(),
                        document.kind.clone().into(),
                    ),
                    loader: FileTextLoader::new(document.file_path.clone()),
                })
                .await?;
        }

        tracing::info!(
            project = key.id(),
            documents = descriptor.documents.len(),
            "project descriptor applied"
        );
        Ok(())
    }

    pub async fn remove_project(&self, key: ProjectKey) -> anyhow::Result<()> {
        self.machine.apply(StateEvent::ProjectRemoved { key }).await?;
        Ok(())
    }

    pub async fn add_document(&self, key: ProjectKey, host: HostDocument) -> anyhow::Result<()> {
        let loader = FileTextLoader::new(host.file_path.clone());
        self.machine
            .apply(StateEvent::DocumentAdded { key, host, loader })
            .await?;
        Ok(())
    }

    pub async fn remove_document(&self, key: ProjectKey, path: PathBuf) -> anyhow::Result<()> {
        self.cancel_inflight(&path);
        self.machine
            .apply(StateEvent::DocumentRemoved { key, path })
            .await?;
        Ok(())
    }

    /// An editor opened `path` with the given buffer contents.
    pub async fn open_document(
        &self,
        key: ProjectKey,
        path: PathBuf,
        text: Arc<str>,
        version: i32,
    ) -> anyhow::Result<()> {
        let newer = self
            .machine
            .apply(StateEvent::DocumentOpened {
                key,
                path: path.clone(),
                text,
                version,
            })
            .await?;
        self.after_content_change(&newer, &path, version).await
    }

    /// The open buffer at `path` changed.
    pub async fn change_document(
        &self,
        key: ProjectKey,
        path: PathBuf,
        text: Arc<str>,
        version: i32,
    ) -> anyhow::Result<()> {
        let newer = self
            .machine
            .apply(StateEvent::DocumentChanged {
                key,
                path: path.clone(),
                text,
                version,
            })
            .await?;
        self.after_content_change(&newer, &path, version).await
    }

    /// The editor closed `path`; the document falls back to disk text.
    pub async fn close_document(&self, key: ProjectKey, path: PathBuf) -> anyhow::Result<()> {
        self.cancel_inflight(&path);
        let loader = FileTextLoader::new(path.clone());
        self.machine
            .apply(StateEvent::DocumentClosed { key, path, loader })
            .await?;
        Ok(())
    }

    /// Process a burst of raw file system changes for one project.
    /// Changes to open documents are ignored; the editor buffer wins.
    pub async fn handle_file_changes(
        &self,
        key: ProjectKey,
        changes: Vec<FileChange>,
    ) -> anyhow::Result<()> {
        for change in coalesce_changes(changes) {
            if self.snapshot().is_open(&change.path) {
                continue;
            }
            match change.kind {
                FileChangeKind::Added => {
                    let target = self
                        .snapshot()
                        .project(&key)
                        .map(|p| target_path_for(p, &change.path))
                        .unwrap_or_else(|| change.path.clone());
                    self.add_document(
                        key.clone(),
                        HostDocument::new(change.path, target, FileKind::Ordinary),
                    )
                    .await?;
                }
                FileChangeKind::Changed => {
                    let text = match std::fs::read_to_string(&change.path) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!(
                                path = %change.path.display(),
                                %err,
                                "changed file unreadable; skipping"
                            );
                            continue;
                        }
                    };
                    let version = self
                        .snapshot()
                        .document(&change.path)
                        .and_then(|d| d.state.text_and_version().ok())
                        .map(|tv| tv.version + 1)
                        .unwrap_or(1);
                    let newer = self
                        .machine
                        .apply(StateEvent::DocumentChanged {
                            key: key.clone(),
                            path: change.path.clone(),
                            text: text.into(),
                            version,
                        })
                        .await?;
                    self.after_content_change(&newer, &change.path, version)
                        .await?;
                }
                FileChangeKind::Removed => {
                    self.remove_document(key.clone(), change.path).await?;
                }
            }
        }
        Ok(())
    }

    /// Regenerate projections for the just-applied document snapshot,
    /// then publish text deltas and diagnostics.
    async fn after_content_change(
        &self,
        newer: &Arc<WorkspaceSnapshot>,
        path: &Path,
        version: i32,
    ) -> anyhow::Result<()> {
        let document = newer
            .document(path)
            .cloned()
            .context("document missing from fresh snapshot")?;
        self.versions.track_version(&document, version);
        self.regenerate(newer, &document, version).await
    }

    async fn regenerate(
        &self,
        snapshot: &Arc<WorkspaceSnapshot>,
        document: &Arc<DocumentSnapshot>,
        version: i32,
    ) -> anyhow::Result<()> {
        let path = document.file_path().to_path_buf();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let token = self.cancel.child_token();
        if let Some((_, superseded)) = self
            .inflight
            .lock()
            .expect("inflight lock poisoned")
            .insert(path.clone(), (generation, token.clone()))
        {
            superseded.cancel();
        }

        let result = self
            .generate_and_publish(snapshot, document, &path, version, &token)
            .await;

        // Clear the tracking entry unless a newer regeneration took it
        // over while this one ran.
        let mut inflight = self.inflight.lock().expect("inflight lock poisoned");
        if inflight
            .get(&path)
            .is_some_and(|(current, _)| *current == generation)
        {
            inflight.remove(&path);
        }

        result
    }

    async fn generate_and_publish(
        &self,
        snapshot: &Arc<WorkspaceSnapshot>,
        document: &Arc<DocumentSnapshot>,
        path: &Path,
        version: i32,
        token: &CancellationToken,
    ) -> anyhow::Result<()> {
        let tv = document.state.text_and_version()?;
        let project = snapshot.project(&document.project_key);
        let input = CompileInput {
            source_text: tv.text,
            kind: document.state.host().kind,
            tags: project.map(|p| p.tags().clone()).unwrap_or_default(),
            root_namespace: project.and_then(|p| p.configuration().root_namespace.clone()),
        };

        let projections = self.compiler.generate(input, token.clone()).await?;
        if token.is_cancelled() {
            // A newer regeneration superseded this one; its output is
            // already stale, so it never reaches the wire.
            tracing::debug!(path = %path.display(), "regeneration superseded");
            return Ok(());
        }

        let projections = Arc::new(projections);
        document.state.set_projections(projections.clone());

        self.publisher
            .publish(
                path,
                projections.script.kind,
                projections.script.text.clone(),
                version,
            )
            .await?;
        self.publisher
            .publish(
                path,
                projections.markup.kind,
                projections.markup.text.clone(),
                version,
            )
            .await?;

        let mut diagnostics: Vec<Diagnostic> = projections.script.diagnostics.clone();
        for diagnostic in &projections.markup.diagnostics {
            if !diagnostics.contains(diagnostic) {
                diagnostics.push(diagnostic.clone());
            }
        }
        self.diagnostics.enqueue(path.to_path_buf(), diagnostics, version);
        Ok(())
    }

    /// Cancel and forget any regeneration in flight for `path`.
    fn cancel_inflight(&self, path: &Path) {
        if let Some((_, token)) = self
            .inflight
            .lock()
            .expect("inflight lock poisoned")
            .remove(path)
        {
            token.cancel();
        }
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }

    /// Tear down: pending diagnostics and in-flight regenerations are
    /// abandoned without side effects, and the listeners unsubscribe so
    /// no further callbacks arrive.
    pub async fn dispose(&self) -> anyhow::Result<()> {
        self.diagnostics.dispose();
        self.cancel.cancel();
        for id in &self.listener_ids {
            self.machine.remove_listener(*id).await?;
        }
        Ok(())
    }
}

fn target_path_for(project: &ProjectState, path: &Path) -> PathBuf {
    project
        .file_path()
        .parent()
        .and_then(|root| path.strip_prefix(root).ok())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}
