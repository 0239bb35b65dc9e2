//! The snapshot state machine and its single-writer dispatcher.
//!
//! All mutations are events drained by one consumer task, so listeners
//! observe a strict total order. Each applied event builds a new
//! immutable [`WorkspaceSnapshot`], publishes it, and broadcasts a
//! [`ChangeEvent`] to every listener before the mutating call returns.
//! Readers call [`StateMachine::snapshot`] and never block the writer.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, oneshot};

use crate::document_state::{DocumentState, TextLoader};
use crate::error::{StateError, StateResult};
use crate::host_document::HostDocument;
use crate::project_state::{ProjectConfiguration, ProjectKey, ProjectState, TagDescriptor};
use crate::snapshot::{DocumentSnapshot, WorkspaceSnapshot};

/// Mutation requests accepted by the state machine.
pub enum StateEvent {
    ProjectAdded {
        key: ProjectKey,
        file_path: PathBuf,
        configuration: ProjectConfiguration,
    },
    ProjectConfigurationChanged {
        key: ProjectKey,
        configuration: ProjectConfiguration,
        tags: Vec<TagDescriptor>,
    },
    ProjectRemoved {
        key: ProjectKey,
    },
    DocumentAdded {
        key: ProjectKey,
        host: HostDocument,
        loader: Arc<dyn TextLoader>,
    },
    DocumentChanged {
        key: ProjectKey,
        path: PathBuf,
        text: Arc<str>,
        version: i32,
    },
    DocumentRemoved {
        key: ProjectKey,
        path: PathBuf,
    },
    DocumentOpened {
        key: ProjectKey,
        path: PathBuf,
        text: Arc<str>,
        version: i32,
    },
    DocumentClosed {
        key: ProjectKey,
        path: PathBuf,
        loader: Arc<dyn TextLoader>,
    },
}

impl fmt::Debug for StateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateEvent::ProjectAdded { key, .. } => write!(f, "ProjectAdded({})", key.id()),
            StateEvent::ProjectConfigurationChanged { key, .. } => {
                write!(f, "ProjectConfigurationChanged({})", key.id())
            }
            StateEvent::ProjectRemoved { key } => write!(f, "ProjectRemoved({})", key.id()),
            StateEvent::DocumentAdded { key, host, .. } => {
                write!(f, "DocumentAdded({}, {})", key.id(), host.file_path.display())
            }
            StateEvent::DocumentChanged { key, path, .. } => {
                write!(f, "DocumentChanged({}, {})", key.id(), path.display())
            }
            StateEvent::DocumentRemoved { key, path } => {
                write!(f, "DocumentRemoved({}, {})", key.id(), path.display())
            }
            StateEvent::DocumentOpened { key, path, .. } => {
                write!(f, "DocumentOpened({}, {})", key.id(), path.display())
            }
            StateEvent::DocumentClosed { key, path, .. } => {
                write!(f, "DocumentClosed({}, {})", key.id(), path.display())
            }
        }
    }
}

/// What changed, as observed by listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    ProjectAdded,
    ProjectChanged,
    ProjectRemoved,
    DocumentAdded,
    DocumentChanged,
    DocumentRemoved,
    DocumentOpened,
    DocumentClosed,
}

/// Broadcast payload: owned snapshots on both sides of the event, plus
/// the fresh document snapshot for document-level events.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub project_key: ProjectKey,
    pub document_path: Option<PathBuf>,
    pub older: Arc<WorkspaceSnapshot>,
    pub newer: Arc<WorkspaceSnapshot>,
    pub document: Option<Arc<DocumentSnapshot>>,
    /// Fresh snapshots minted for documents re-homed by a removal.
    /// Identity-correlating consumers must re-tag these.
    pub rehomed: Vec<Arc<DocumentSnapshot>>,
}

/// Listener invoked inside the serialization domain, synchronously with
/// each applied event. Implementations must not re-enter the machine.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

/// Handle for unsubscribing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

enum Command {
    Apply(
        StateEvent,
        oneshot::Sender<StateResult<Arc<WorkspaceSnapshot>>>,
    ),
    AddListener(Arc<dyn ChangeListener>, oneshot::Sender<ListenerId>),
    RemoveListener(ListenerId, oneshot::Sender<()>),
}

/// The serialized mutation point for all project/document state.
pub struct StateMachine {
    tx: mpsc::UnboundedSender<Command>,
    current: Arc<RwLock<Arc<WorkspaceSnapshot>>>,
}

impl StateMachine {
    /// Spawn the dispatcher task. Must be called within a tokio runtime.
    pub fn new() -> Self {
        let initial = Arc::new(
            WorkspaceSnapshot::default().with_project(ProjectState::new(
                ProjectKey::miscellaneous(),
                "",
                ProjectConfiguration::default(),
            )),
        );
        let current = Arc::new(RwLock::new(initial.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let published = current.clone();
        tokio::spawn(async move {
            let mut store = Store {
                snapshot: initial,
                listeners: Vec::new(),
                next_listener_id: 0,
            };
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Apply(event, ack) => {
                        let result = store.apply(event);
                        match result {
                            Ok(Some(change)) => {
                                *published.write().expect("snapshot lock poisoned") =
                                    change.newer.clone();
                                store.notify(&change);
                                let _ = ack.send(Ok(change.newer));
                            }
                            Ok(None) => {
                                let _ = ack.send(Ok(store.snapshot.clone()));
                            }
                            Err(err) => {
                                let _ = ack.send(Err(err));
                            }
                        }
                    }
                    Command::AddListener(listener, ack) => {
                        let id = store.add_listener(listener);
                        let _ = ack.send(id);
                    }
                    Command::RemoveListener(id, ack) => {
                        store.listeners.retain(|(lid, _)| *lid != id);
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { tx, current }
    }

    /// Apply one event. Resolves after the new snapshot is published and
    /// every listener has been notified.
    pub async fn apply(&self, event: StateEvent) -> StateResult<Arc<WorkspaceSnapshot>> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Apply(event, ack))
            .map_err(|_| StateError::DispatcherGone)?;
        done.await.map_err(|_| StateError::DispatcherGone)?
    }

    /// Current published snapshot. Readers either see the snapshot from
    /// before an in-flight event or the fully built one after it.
    pub fn snapshot(&self) -> Arc<WorkspaceSnapshot> {
        self.current.read().expect("snapshot lock poisoned").clone()
    }

    pub async fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> StateResult<ListenerId> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::AddListener(listener, ack))
            .map_err(|_| StateError::DispatcherGone)?;
        done.await.map_err(|_| StateError::DispatcherGone)
    }

    pub async fn remove_listener(&self, id: ListenerId) -> StateResult<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::RemoveListener(id, ack))
            .map_err(|_| StateError::DispatcherGone)?;
        done.await.map_err(|_| StateError::DispatcherGone)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable core owned exclusively by the dispatcher task.
struct Store {
    snapshot: Arc<WorkspaceSnapshot>,
    listeners: Vec<(ListenerId, Arc<dyn ChangeListener>)>,
    next_listener_id: u64,
}

impl Store {
    fn add_listener(&mut self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    fn notify(&self, event: &ChangeEvent) {
        for (_, listener) in &self.listeners {
            listener.on_change(event);
        }
    }

    /// Apply one event against the current snapshot. `Ok(None)` means
    /// the event was a no-op request and produced no new snapshot.
    fn apply(&mut self, event: StateEvent) -> StateResult<Option<ChangeEvent>> {
        let older = self.snapshot.clone();
        let outcome = match event {
            StateEvent::ProjectAdded {
                key,
                file_path,
                configuration,
            } => self.apply_project_added(key, file_path, configuration),
            StateEvent::ProjectConfigurationChanged {
                key,
                configuration,
                tags,
            } => self.apply_project_configuration_changed(key, configuration, tags),
            StateEvent::ProjectRemoved { key } => self.apply_project_removed(key),
            StateEvent::DocumentAdded { key, host, loader } => {
                self.apply_document_added(key, host, loader)
            }
            StateEvent::DocumentChanged {
                key,
                path,
                text,
                version,
            } => self.apply_document_changed(key, path, text, version),
            StateEvent::DocumentRemoved { key, path } => self.apply_document_removed(key, path),
            StateEvent::DocumentOpened {
                key,
                path,
                text,
                version,
            } => self.apply_document_opened(key, path, text, version),
            StateEvent::DocumentClosed { key, path, loader } => {
                self.apply_document_closed(key, path, loader)
            }
        }?;

        Ok(outcome.map(|(kind, project_key, document_path, newer, document, rehomed)| {
            let newer = Arc::new(newer);
            self.snapshot = newer.clone();
            ChangeEvent {
                kind,
                project_key,
                document_path,
                older,
                newer,
                document,
                rehomed,
            }
        }))
    }

    fn project(&self, key: &ProjectKey) -> StateResult<Arc<ProjectState>> {
        self.snapshot
            .project(key)
            .cloned()
            .ok_or_else(|| StateError::UnknownProject(key.clone()))
    }

    fn apply_project_added(
        &mut self,
        key: ProjectKey,
        file_path: PathBuf,
        configuration: ProjectConfiguration,
    ) -> StateResult<Outcome> {
        if self.snapshot.project(&key).is_some() {
            tracing::warn!(project = key.id(), "project already known; add ignored");
            return Ok(None);
        }
        let project = ProjectState::new(key.clone(), file_path, configuration);
        let newer = self.snapshot.with_project(project);
        Ok(Some((ChangeKind::ProjectAdded, key, None, newer, None, Vec::new())))
    }

    fn apply_project_configuration_changed(
        &mut self,
        key: ProjectKey,
        configuration: ProjectConfiguration,
        tags: Vec<TagDescriptor>,
    ) -> StateResult<Outcome> {
        let project = self.project(&key)?;
        let updated = project.with_configuration(configuration).with_tags(tags);
        let newer = self.snapshot.with_project(updated);
        Ok(Some((ChangeKind::ProjectChanged, key, None, newer, None, Vec::new())))
    }

    fn apply_project_removed(&mut self, key: ProjectKey) -> StateResult<Outcome> {
        let project = self.project(&key)?;
        let mut newer = self.snapshot.without_project(&key);
        let mut rehomed = Vec::new();

        // Re-home every owned document: to a sibling project that owns
        // the same path if one exists, otherwise to miscellaneous.
        for (path, state) in project.documents() {
            let others = self.snapshot.other_owners_of(path, &key);
            if let Some(other) = others.first() {
                let other_state = newer
                    .project(other)
                    .and_then(|p| p.document(path))
                    .cloned()
                    .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;
                let snapshot = DocumentSnapshot::new(other.clone(), other_state);
                newer = newer.with_document_snapshot(snapshot.clone());
                rehomed.push(snapshot);
            } else {
                let misc_key = ProjectKey::miscellaneous();
                let misc = newer
                    .project(&misc_key)
                    .cloned()
                    .ok_or_else(|| StateError::UnknownProject(misc_key.clone()))?;
                if let Some(migrated) = misc.with_added_document(state.clone()) {
                    newer = newer.with_project(migrated);
                }
                let snapshot = DocumentSnapshot::new(misc_key, state.clone());
                newer = newer.with_document_snapshot(snapshot.clone());
                rehomed.push(snapshot);
            }
        }

        tracing::debug!(project = key.id(), "project removed; documents re-homed");
        Ok(Some((ChangeKind::ProjectRemoved, key, None, newer, None, rehomed)))
    }

    fn apply_document_added(
        &mut self,
        key: ProjectKey,
        host: HostDocument,
        loader: Arc<dyn TextLoader>,
    ) -> StateResult<Outcome> {
        let project = self.project(&key)?;
        let path = host.file_path.clone();

        // A document previously parked in the miscellaneous project
        // migrates out once a concrete owner becomes known, keeping its
        // text loader (and any already-loaded text).
        let misc_key = ProjectKey::miscellaneous();
        let parked = if key != misc_key {
            self.snapshot
                .project(&misc_key)
                .and_then(|misc| misc.document(&path))
                .cloned()
        } else {
            None
        };

        let state = match parked {
            Some(parked) => parked,
            None => DocumentState::new(Arc::new(host), loader),
        };

        let Some(updated) = project.with_added_document(state.clone()) else {
            tracing::warn!(
                project = key.id(),
                path = %path.display(),
                "target path already present; document add ignored"
            );
            return Ok(None);
        };

        let mut newer = self.snapshot.with_project(updated);
        if key != misc_key {
            if let Some(misc) = newer.project(&misc_key) {
                if let Some(shrunk) = misc.with_removed_document(&path) {
                    newer = newer.with_project(shrunk);
                }
            }
        }
        let snapshot = DocumentSnapshot::new(key.clone(), state);
        let newer = newer.with_document_snapshot(snapshot.clone());

        Ok(Some((
            ChangeKind::DocumentAdded,
            key,
            Some(path),
            newer,
            Some(snapshot),
            Vec::new(),
        )))
    }

    fn apply_document_changed(
        &mut self,
        key: ProjectKey,
        path: PathBuf,
        text: Arc<str>,
        version: i32,
    ) -> StateResult<Outcome> {
        let project = self.project(&key)?;
        let state = project
            .document(&path)
            .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;

        let replaced = state.with_text(text, version);
        let updated = project
            .with_changed_document(&path, replaced.clone())
            .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;

        let snapshot = DocumentSnapshot::new(key.clone(), replaced);
        let newer = self
            .snapshot
            .with_project(updated)
            .with_document_snapshot(snapshot.clone());

        Ok(Some((
            ChangeKind::DocumentChanged,
            key,
            Some(path),
            newer,
            Some(snapshot),
            Vec::new(),
        )))
    }

    fn apply_document_removed(&mut self, key: ProjectKey, path: PathBuf) -> StateResult<Outcome> {
        let project = self.project(&key)?;
        let state = project
            .document(&path)
            .cloned()
            .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;
        let updated = project
            .with_removed_document(&path)
            .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;

        let mut newer = self.snapshot.with_project(updated);
        let mut rehomed = Vec::new();

        let others = self.snapshot.other_owners_of(&path, &key);
        if let Some(other) = others.first() {
            let other_state = newer
                .project(other)
                .and_then(|p| p.document(&path))
                .cloned()
                .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;
            let snapshot = DocumentSnapshot::new(other.clone(), other_state);
            newer = newer.with_document_snapshot(snapshot.clone());
            rehomed.push(snapshot);
        } else if self.snapshot.is_open(&path) && !key.is_miscellaneous() {
            // Removed while open: the document stays mappable under the
            // miscellaneous project until it is closed.
            let misc_key = ProjectKey::miscellaneous();
            let misc = newer
                .project(&misc_key)
                .cloned()
                .ok_or_else(|| StateError::UnknownProject(misc_key.clone()))?;
            if let Some(migrated) = misc.with_added_document(state.clone()) {
                newer = newer.with_project(migrated);
            }
            let snapshot = DocumentSnapshot::new(misc_key, state);
            newer = newer.with_document_snapshot(snapshot.clone());
            rehomed.push(snapshot);
        } else {
            newer = newer.without_document_snapshot(&path);
        }

        Ok(Some((
            ChangeKind::DocumentRemoved,
            key,
            Some(path),
            newer,
            None,
            rehomed,
        )))
    }

    fn apply_document_opened(
        &mut self,
        key: ProjectKey,
        path: PathBuf,
        text: Arc<str>,
        version: i32,
    ) -> StateResult<Outcome> {
        let project = self.project(&key)?;
        let state = project
            .document(&path)
            .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;

        let opened = state.with_text(text, version);
        let updated = project
            .with_changed_document(&path, opened.clone())
            .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;

        let snapshot = DocumentSnapshot::new(key.clone(), opened);
        let newer = self
            .snapshot
            .with_project(updated)
            .with_document_snapshot(snapshot.clone())
            .with_open(&path, true);

        Ok(Some((
            ChangeKind::DocumentOpened,
            key,
            Some(path),
            newer,
            Some(snapshot),
            Vec::new(),
        )))
    }

    fn apply_document_closed(
        &mut self,
        key: ProjectKey,
        path: PathBuf,
        loader: Arc<dyn TextLoader>,
    ) -> StateResult<Outcome> {
        let project = self.project(&key)?;
        let state = project
            .document(&path)
            .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;

        let closed = state.with_loader(loader);
        let updated = project
            .with_changed_document(&path, closed.clone())
            .ok_or_else(|| StateError::UnknownDocument(path.clone()))?;

        let snapshot = DocumentSnapshot::new(key.clone(), closed);
        let newer = self
            .snapshot
            .with_project(updated)
            .with_document_snapshot(snapshot.clone())
            .with_open(&path, false);

        Ok(Some((
            ChangeKind::DocumentClosed,
            key,
            Some(path),
            newer,
            Some(snapshot),
            Vec::new(),
        )))
    }
}

type Outcome = Option<(
    ChangeKind,
    ProjectKey,
    Option<PathBuf>,
    WorkspaceSnapshot,
    Option<Arc<DocumentSnapshot>>,
    Vec<Arc<DocumentSnapshot>>,
)>;

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use super::*;
    use crate::document_state::StaticTextLoader;
    use crate::host_document::FileKind;

    fn key(id: &str) -> ProjectKey {
        ProjectKey::new(id)
    }

    fn host(path: &str) -> HostDocument {
        HostDocument::new(path, path.trim_start_matches("/ws/"), FileKind::Ordinary)
    }

    async fn machine_with_project(id: &str) -> StateMachine {
        let machine = StateMachine::new();
        machine
            .apply(StateEvent::ProjectAdded {
                key: key(id),
                file_path: PathBuf::from(format!("/ws/{id}.wproj")),
                configuration: ProjectConfiguration::default(),
            })
            .await
            .unwrap();
        machine
    }

    async fn add_document(machine: &StateMachine, project: &str, path: &str) {
        machine
            .apply(StateEvent::DocumentAdded {
                key: key(project),
                host: host(path),
                loader: StaticTextLoader::new("", 1),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_project_added_appears_in_snapshot() {
        let machine = machine_with_project("app").await;
        assert!(machine.snapshot().project(&key("app")).is_some());
        assert!(machine
            .snapshot()
            .project(&ProjectKey::miscellaneous())
            .is_some());
    }

    #[tokio::test]
    async fn test_duplicate_project_add_is_noop() {
        let machine = machine_with_project("app").await;
        let before = machine.snapshot();
        machine
            .apply(StateEvent::ProjectAdded {
                key: key("app"),
                file_path: "/elsewhere/app.wproj".into(),
                configuration: ProjectConfiguration::default(),
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&before, &machine.snapshot()));
    }

    #[tokio::test]
    async fn test_unknown_project_mutation_is_hard_failure() {
        let machine = StateMachine::new();
        let result = machine
            .apply(StateEvent::DocumentChanged {
                key: key("ghost"),
                path: "/ws/a.weft".into(),
                text: "".into(),
                version: 1,
            })
            .await;
        assert!(matches!(result, Err(StateError::UnknownProject(_))));
    }

    #[tokio::test]
    async fn test_document_added_and_changed() {
        let machine = machine_with_project("app").await;
        add_document(&machine, "app", "/ws/a.weft").await;

        machine
            .apply(StateEvent::DocumentChanged {
                key: key("app"),
                path: "/ws/a.weft".into(),
                text: "<p>new</p>".into(),
                version: 2,
            })
            .await
            .unwrap();

        let snapshot = machine.snapshot();
        let doc = snapshot.document(Path::new("/ws/a.weft")).unwrap();
        let tv = doc.state.text_and_version().unwrap();
        assert_eq!(&*tv.text, "<p>new</p>");
        assert_eq!(tv.version, 2);
    }

    #[tokio::test]
    async fn test_duplicate_document_add_is_noop() {
        let machine = machine_with_project("app").await;
        add_document(&machine, "app", "/ws/a.weft").await;
        let before = machine.snapshot();
        add_document(&machine, "app", "/ws/a.weft").await;
        assert!(Arc::ptr_eq(&before, &machine.snapshot()));
    }

    #[tokio::test]
    async fn test_document_change_keeps_sibling_identity() {
        let machine = machine_with_project("app").await;
        add_document(&machine, "app", "/ws/a.weft").await;
        add_document(&machine, "app", "/ws/b.weft").await;

        let before = machine.snapshot();
        let sibling_before = before
            .project(&key("app"))
            .unwrap()
            .document(Path::new("/ws/b.weft"))
            .unwrap()
            .clone();

        machine
            .apply(StateEvent::DocumentChanged {
                key: key("app"),
                path: "/ws/a.weft".into(),
                text: "x".into(),
                version: 2,
            })
            .await
            .unwrap();

        let sibling_after = machine
            .snapshot()
            .project(&key("app"))
            .unwrap()
            .document(Path::new("/ws/b.weft"))
            .unwrap()
            .clone();
        assert!(Arc::ptr_eq(&sibling_before, &sibling_after));
    }

    #[tokio::test]
    async fn test_unowned_document_parks_in_miscellaneous_then_migrates() {
        let machine = StateMachine::new();
        machine
            .apply(StateEvent::DocumentAdded {
                key: ProjectKey::miscellaneous(),
                host: host("/ws/orphan.weft"),
                loader: StaticTextLoader::new("body", 1),
            })
            .await
            .unwrap();

        let parked = machine
            .snapshot()
            .project(&ProjectKey::miscellaneous())
            .unwrap()
            .document(Path::new("/ws/orphan.weft"))
            .cloned()
            .unwrap();

        // Build metadata arrives: a concrete project claims the file.
        machine
            .apply(StateEvent::ProjectAdded {
                key: key("app"),
                file_path: "/ws/app.wproj".into(),
                configuration: ProjectConfiguration::default(),
            })
            .await
            .unwrap();
        machine
            .apply(StateEvent::DocumentAdded {
                key: key("app"),
                host: host("/ws/orphan.weft"),
                loader: StaticTextLoader::new("ignored", 9),
            })
            .await
            .unwrap();

        let snapshot = machine.snapshot();
        let misc = snapshot.project(&ProjectKey::miscellaneous()).unwrap();
        assert!(misc.document(Path::new("/ws/orphan.weft")).is_none());

        let owned = snapshot
            .project(&key("app"))
            .unwrap()
            .document(Path::new("/ws/orphan.weft"))
            .unwrap();
        // The parked state (and its loader) was preserved.
        assert!(Arc::ptr_eq(owned, &parked));
        assert_eq!(&*owned.text_and_version().unwrap().text, "body");
    }

    #[tokio::test]
    async fn test_project_removed_migrates_documents() {
        let machine = machine_with_project("gone").await;
        add_document(&machine, "gone", "/ws/a.weft").await;
        add_document(&machine, "gone", "/ws/b.weft").await;

        // A sibling project also owns /ws/a.weft.
        machine
            .apply(StateEvent::ProjectAdded {
                key: key("keeper"),
                file_path: "/ws/keeper.wproj".into(),
                configuration: ProjectConfiguration::default(),
            })
            .await
            .unwrap();
        add_document(&machine, "keeper", "/ws/a.weft").await;

        machine
            .apply(StateEvent::ProjectRemoved { key: key("gone") })
            .await
            .unwrap();

        let snapshot = machine.snapshot();
        assert!(snapshot.project(&key("gone")).is_none());

        // a.weft survives under the sibling, b.weft under miscellaneous.
        let a = snapshot.document(Path::new("/ws/a.weft")).unwrap();
        assert_eq!(a.project_key, key("keeper"));
        let b = snapshot.document(Path::new("/ws/b.weft")).unwrap();
        assert!(b.project_key.is_miscellaneous());
        assert!(snapshot
            .project(&ProjectKey::miscellaneous())
            .unwrap()
            .document(Path::new("/ws/b.weft"))
            .is_some());
    }

    #[tokio::test]
    async fn test_open_close_changes_only_status() {
        let machine = machine_with_project("app").await;
        add_document(&machine, "app", "/ws/a.weft").await;

        machine
            .apply(StateEvent::DocumentOpened {
                key: key("app"),
                path: "/ws/a.weft".into(),
                text: "edited".into(),
                version: 5,
            })
            .await
            .unwrap();
        assert!(machine.snapshot().is_open(Path::new("/ws/a.weft")));

        machine
            .apply(StateEvent::DocumentClosed {
                key: key("app"),
                path: "/ws/a.weft".into(),
                loader: StaticTextLoader::new("on disk", 1),
            })
            .await
            .unwrap();

        let snapshot = machine.snapshot();
        assert!(!snapshot.is_open(Path::new("/ws/a.weft")));
        // Still owned by the project.
        assert!(snapshot
            .project(&key("app"))
            .unwrap()
            .document(Path::new("/ws/a.weft"))
            .is_some());
    }

    #[tokio::test]
    async fn test_removed_while_open_stays_mappable_in_miscellaneous() {
        let machine = machine_with_project("app").await;
        add_document(&machine, "app", "/ws/a.weft").await;
        machine
            .apply(StateEvent::DocumentOpened {
                key: key("app"),
                path: "/ws/a.weft".into(),
                text: "buffer".into(),
                version: 3,
            })
            .await
            .unwrap();

        machine
            .apply(StateEvent::DocumentRemoved {
                key: key("app"),
                path: "/ws/a.weft".into(),
            })
            .await
            .unwrap();

        let snapshot = machine.snapshot();
        let doc = snapshot.document(Path::new("/ws/a.weft")).unwrap();
        assert!(doc.project_key.is_miscellaneous());
        assert!(snapshot.is_open(Path::new("/ws/a.weft")));
    }

    #[tokio::test]
    async fn test_removed_while_closed_disappears() {
        let machine = machine_with_project("app").await;
        add_document(&machine, "app", "/ws/a.weft").await;
        machine
            .apply(StateEvent::DocumentRemoved {
                key: key("app"),
                path: "/ws/a.weft".into(),
            })
            .await
            .unwrap();
        assert!(machine.snapshot().document(Path::new("/ws/a.weft")).is_none());
    }

    struct Recorder {
        kinds: Mutex<Vec<ChangeKind>>,
    }

    impl ChangeListener for Recorder {
        fn on_change(&self, event: &ChangeEvent) {
            self.kinds.lock().unwrap().push(event.kind);
        }
    }

    #[tokio::test]
    async fn test_listeners_observe_total_order_before_apply_returns() {
        let machine = machine_with_project("app").await;
        let recorder = Arc::new(Recorder {
            kinds: Mutex::new(Vec::new()),
        });
        machine.add_listener(recorder.clone()).await.unwrap();

        add_document(&machine, "app", "/ws/a.weft").await;
        // Notification completed before apply returned.
        assert_eq!(
            *recorder.kinds.lock().unwrap(),
            vec![ChangeKind::DocumentAdded]
        );

        machine
            .apply(StateEvent::DocumentOpened {
                key: key("app"),
                path: "/ws/a.weft".into(),
                text: "t".into(),
                version: 1,
            })
            .await
            .unwrap();
        machine
            .apply(StateEvent::DocumentClosed {
                key: key("app"),
                path: "/ws/a.weft".into(),
                loader: StaticTextLoader::new("", 1),
            })
            .await
            .unwrap();

        assert_eq!(
            *recorder.kinds.lock().unwrap(),
            vec![
                ChangeKind::DocumentAdded,
                ChangeKind::DocumentOpened,
                ChangeKind::DocumentClosed
            ]
        );
    }

    #[tokio::test]
    async fn test_removed_listener_stops_receiving() {
        let machine = machine_with_project("app").await;
        let recorder = Arc::new(Recorder {
            kinds: Mutex::new(Vec::new()),
        });
        let id = machine.add_listener(recorder.clone()).await.unwrap();
        machine.remove_listener(id).await.unwrap();

        add_document(&machine, "app", "/ws/a.weft").await;
        assert!(recorder.kinds.lock().unwrap().is_empty());
    }
}
