//! Authored document identity.

use std::path::{Path, PathBuf};

/// Kind of authored file. Component files get component-scoped
/// projection output; ordinary files do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Ordinary,
    Component,
}

/// Identity of an authored `.weft` file: where it lives on disk and the
/// logical path it is addressed by inside its project.
///
/// A host document is owned by exactly one project state at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostDocument {
    pub file_path: PathBuf,
    pub target_path: PathBuf,
    pub kind: FileKind,
}

impl HostDocument {
    pub fn new(
        file_path: impl Into<PathBuf>,
        target_path: impl Into<PathBuf>,
        kind: FileKind,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            target_path: target_path.into(),
            kind,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_document_paths() {
        let doc = HostDocument::new("/ws/pages/home.weft", "pages/home.weft", FileKind::Component);
        assert_eq!(doc.file_path(), Path::new("/ws/pages/home.weft"));
        assert_eq!(doc.kind, FileKind::Component);
    }
}
