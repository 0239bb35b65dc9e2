//! Immutable per-document state.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use weft_common::{CommonError, CommonResult};
use weft_mapping::GeneratedDocument;

use crate::host_document::HostDocument;

/// Text plus the version number the editor assigned to it.
#[derive(Debug, Clone)]
pub struct TextAndVersion {
    pub text: Arc<str>,
    pub version: i32,
}

/// Source of a document's text. Loading is deferred until a consumer
/// first asks, so adding thousands of documents stays cheap.
pub trait TextLoader: Send + Sync {
    fn load(&self) -> CommonResult<TextAndVersion>;
}

/// Loader over text already in memory.
pub struct StaticTextLoader {
    text: Arc<str>,
    version: i32,
}

impl StaticTextLoader {
    pub fn new(text: impl Into<Arc<str>>, version: i32) -> Arc<Self> {
        Arc::new(Self {
            text: text.into(),
            version,
        })
    }
}

impl TextLoader for StaticTextLoader {
    fn load(&self) -> CommonResult<TextAndVersion> {
        Ok(TextAndVersion {
            text: self.text.clone(),
            version: self.version,
        })
    }
}

/// Loader that reads the authored file from disk on first use.
pub struct FileTextLoader {
    path: std::path::PathBuf,
}

impl FileTextLoader {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Arc<Self> {
        Arc::new(Self { path: path.into() })
    }
}

impl TextLoader for FileTextLoader {
    fn load(&self) -> CommonResult<TextAndVersion> {
        let text = std::fs::read_to_string(&self.path).map_err(CommonError::Io)?;
        Ok(TextAndVersion {
            text: text.into(),
            version: 1,
        })
    }
}

/// The two projections generated from one authored document.
#[derive(Debug, Clone)]
pub struct Projections {
    pub script: GeneratedDocument,
    pub markup: GeneratedDocument,
}

/// Immutable state of one authored document: its identity, a lazily
/// loaded text/version pair, and the most recently generated
/// projections. Every content change produces a new instance; the old
/// one is never touched.
pub struct DocumentState {
    host: Arc<HostDocument>,
    loader: Arc<dyn TextLoader>,
    // Lazy caches. Writing these is initialization, not mutation: the
    // loaded text of a given DocumentState never changes once observed.
    loaded: Mutex<Option<TextAndVersion>>,
    projections: OnceLock<Arc<Projections>>,
}

impl DocumentState {
    pub fn new(host: Arc<HostDocument>, loader: Arc<dyn TextLoader>) -> Arc<Self> {
        Arc::new(Self {
            host,
            loader,
            loaded: Mutex::new(None),
            projections: OnceLock::new(),
        })
    }

    /// New state for the same host document with replacement text.
    pub fn with_text(&self, text: impl Into<Arc<str>>, version: i32) -> Arc<Self> {
        DocumentState::new(self.host.clone(), StaticTextLoader::new(text, version))
    }

    /// New state for the same host document re-reading its loader.
    pub fn with_loader(&self, loader: Arc<dyn TextLoader>) -> Arc<Self> {
        DocumentState::new(self.host.clone(), loader)
    }

    pub fn host(&self) -> &Arc<HostDocument> {
        &self.host
    }

    pub fn loader(&self) -> &Arc<dyn TextLoader> {
        &self.loader
    }

    /// Document text and version, loading through the text loader on
    /// first call.
    pub fn text_and_version(&self) -> CommonResult<TextAndVersion> {
        let mut loaded = self.loaded.lock().expect("document text lock poisoned");
        if let Some(tv) = loaded.as_ref() {
            return Ok(tv.clone());
        }
        let tv = self.loader.load()?;
        *loaded = Some(tv.clone());
        Ok(tv)
    }

    /// Attach generated projections. First writer wins; a racing
    /// duplicate generation for the same state is discarded.
    pub fn set_projections(&self, projections: Arc<Projections>) {
        let _ = self.projections.set(projections);
    }

    pub fn projections(&self) -> Option<Arc<Projections>> {
        self.projections.get().cloned()
    }
}

impl fmt::Debug for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentState")
            .field("host", &self.host)
            .field("has_projections", &self.projections.get().is_some())
            .finish()
    }
}
