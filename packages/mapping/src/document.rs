//! Generated projection documents and their mapping tables.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use weft_common::TextSpan;

/// Which projection of the authored document this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// The generated procedural-script document.
    Script,
    /// The generated markup document.
    Markup,
}

/// One entry of a projection's mapping table: a span of the authored
/// document and the span it became in the generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMapping {
    pub original: TextSpan,
    pub generated: TextSpan,
}

impl SourceMapping {
    pub fn new(original: TextSpan, generated: TextSpan) -> Self {
        Self { original, generated }
    }
}

/// Diagnostic severity reported by the projection compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// A diagnostic attached to a generated document, positioned in the
/// authored document's coordinates when a span is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<TextSpan>,
}

/// Immutable generated document: projection text, the ordered mapping
/// table back to the authored source, and compiler diagnostics.
///
/// Mapping tables are ordered by generated offset and generated spans
/// never overlap; the compiler collaborator guarantees both.
#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub kind: ProjectionKind,
    /// Authored document text the projection was generated from.
    pub source_text: Arc<str>,
    /// Generated projection text.
    pub text: Arc<str>,
    pub mappings: Vec<SourceMapping>,
    pub diagnostics: Vec<Diagnostic>,
}

impl GeneratedDocument {
    pub fn new(
        kind: ProjectionKind,
        source_text: Arc<str>,
        text: Arc<str>,
        mappings: Vec<SourceMapping>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        debug_assert!(
            mappings.windows(2).all(|w| w[0].generated.end() <= w[1].generated.offset),
            "mapping table must be ordered with non-overlapping generated spans"
        );
        Self {
            kind,
            source_text,
            text,
            mappings,
            diagnostics,
        }
    }
}
