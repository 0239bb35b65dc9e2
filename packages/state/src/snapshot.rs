//! Immutable snapshots exposed to readers.
//!
//! A snapshot is an identity-bearing view of state at one point in the
//! event order. The Version Cache correlates against snapshot identity
//! (`Arc::ptr_eq`), never content, so the machine hands out a fresh
//! `DocumentSnapshot` whenever a document's state or ownership changes
//! and reuses the existing one otherwise.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::document_state::DocumentState;
use crate::project_state::{ProjectKey, ProjectState};

/// Reader-facing view of one document at one point in the event order.
#[derive(Debug)]
pub struct DocumentSnapshot {
    pub project_key: ProjectKey,
    pub state: Arc<DocumentState>,
}

impl DocumentSnapshot {
    pub fn new(project_key: ProjectKey, state: Arc<DocumentState>) -> Arc<Self> {
        Arc::new(Self { project_key, state })
    }

    pub fn file_path(&self) -> &Path {
        self.state.host().file_path()
    }
}

/// Top-level immutable snapshot: every project, the current document
/// snapshot per path, and the set of open documents.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSnapshot {
    projects: HashMap<ProjectKey, Arc<ProjectState>>,
    documents: HashMap<PathBuf, Arc<DocumentSnapshot>>,
    open: HashSet<PathBuf>,
}

impl WorkspaceSnapshot {
    pub fn project(&self, key: &ProjectKey) -> Option<&Arc<ProjectState>> {
        self.projects.get(key)
    }

    pub fn projects(&self) -> impl Iterator<Item = &Arc<ProjectState>> {
        self.projects.values()
    }

    pub fn document(&self, path: &Path) -> Option<&Arc<DocumentSnapshot>> {
        self.documents.get(path)
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.open.contains(path)
    }

    pub fn open_documents(&self) -> impl Iterator<Item = &PathBuf> {
        self.open.iter()
    }

    /// Projects other than `except` that own a document at `path`.
    pub fn other_owners_of(&self, path: &Path, except: &ProjectKey) -> Vec<ProjectKey> {
        self.projects
            .values()
            .filter(|p| p.key() != except && p.document(path).is_some())
            .map(|p| p.key().clone())
            .collect()
    }

    // Builder-style internals used by the state machine. These consume
    // and clone; readers never see the intermediate values.

    pub(crate) fn with_project(&self, project: Arc<ProjectState>) -> Self {
        let mut next = self.clone();
        next.projects.insert(project.key().clone(), project);
        next
    }

    pub(crate) fn without_project(&self, key: &ProjectKey) -> Self {
        let mut next = self.clone();
        next.projects.remove(key);
        next
    }

    pub(crate) fn with_document_snapshot(&self, snapshot: Arc<DocumentSnapshot>) -> Self {
        let mut next = self.clone();
        next.documents
            .insert(snapshot.file_path().to_path_buf(), snapshot);
        next
    }

    pub(crate) fn without_document_snapshot(&self, path: &Path) -> Self {
        let mut next = self.clone();
        next.documents.remove(path);
        next
    }

    pub(crate) fn with_open(&self, path: &Path, open: bool) -> Self {
        let mut next = self.clone();
        if open {
            next.open.insert(path.to_path_buf());
        } else {
            next.open.remove(path);
        }
        next
    }
}
