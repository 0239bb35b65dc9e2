//! Immutable per-project state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::document_state::DocumentState;

/// Stable project identity. Two projects may share a file path (one per
/// build configuration); the key tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Key of the per-workspace catch-all project hosting documents not
    /// owned by any concrete project.
    pub fn miscellaneous() -> Self {
        Self("__misc__".to_string())
    }

    pub fn is_miscellaneous(&self) -> bool {
        self.0 == "__misc__"
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Build configuration metadata for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfiguration {
    pub configuration_name: String,
    pub root_namespace: Option<String>,
}

impl Default for ProjectConfiguration {
    fn default() -> Self {
        Self {
            configuration_name: "default".to_string(),
            root_namespace: None,
        }
    }
}

/// Workspace-derived component/tag metadata the compiler consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDescriptor {
    pub name: String,
    pub assembly: String,
}

/// Immutable state of one project: configuration, tag metadata, and the
/// documents it owns, keyed by authored file path.
///
/// All `with_*` constructors return a new instance; document states that
/// did not change keep referential identity across the copy.
#[derive(Debug, Clone)]
pub struct ProjectState {
    key: ProjectKey,
    file_path: PathBuf,
    configuration: ProjectConfiguration,
    tags: Arc<Vec<TagDescriptor>>,
    documents: HashMap<PathBuf, Arc<DocumentState>>,
}

impl ProjectState {
    pub fn new(
        key: ProjectKey,
        file_path: impl Into<PathBuf>,
        configuration: ProjectConfiguration,
    ) -> Arc<Self> {
        Arc::new(Self {
            key,
            file_path: file_path.into(),
            configuration,
            tags: Arc::new(Vec::new()),
            documents: HashMap::new(),
        })
    }

    pub fn key(&self) -> &ProjectKey {
        &self.key
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn configuration(&self) -> &ProjectConfiguration {
        &self.configuration
    }

    pub fn tags(&self) -> &Arc<Vec<TagDescriptor>> {
        &self.tags
    }

    pub fn document(&self, path: &Path) -> Option<&Arc<DocumentState>> {
        self.documents.get(path)
    }

    pub fn document_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.documents.keys()
    }

    pub fn documents(&self) -> &HashMap<PathBuf, Arc<DocumentState>> {
        &self.documents
    }

    /// True if any owned document has the given target path.
    pub fn owns_target_path(&self, target_path: &Path) -> bool {
        self.documents
            .values()
            .any(|d| d.host().target_path == target_path)
    }

    pub fn with_configuration(&self, configuration: ProjectConfiguration) -> Arc<Self> {
        let mut next = self.clone();
        next.configuration = configuration;
        Arc::new(next)
    }

    pub fn with_tags(&self, tags: Vec<TagDescriptor>) -> Arc<Self> {
        let mut next = self.clone();
        next.tags = Arc::new(tags);
        Arc::new(next)
    }

    /// Add a document. Returns `None` when a document with the same
    /// target path already exists; the caller treats that as a no-op.
    pub fn with_added_document(&self, document: Arc<DocumentState>) -> Option<Arc<Self>> {
        if self.owns_target_path(&document.host().target_path) {
            return None;
        }
        let mut next = self.clone();
        next.documents
            .insert(document.host().file_path.clone(), document);
        Some(Arc::new(next))
    }

    /// Replace one document's state. Sibling entries keep referential
    /// identity. Returns `None` if the path is not owned here.
    pub fn with_changed_document(
        &self,
        path: &Path,
        document: Arc<DocumentState>,
    ) -> Option<Arc<Self>> {
        if !self.documents.contains_key(path) {
            return None;
        }
        let mut next = self.clone();
        next.documents.insert(path.to_path_buf(), document);
        Some(Arc::new(next))
    }

    /// Remove a document. Returns `None` if the path is not owned here.
    pub fn with_removed_document(&self, path: &Path) -> Option<Arc<Self>> {
        if !self.documents.contains_key(path) {
            return None;
        }
        let mut next = self.clone();
        next.documents.remove(path);
        Some(Arc::new(next))
    }
}
