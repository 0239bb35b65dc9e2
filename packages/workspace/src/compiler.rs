//! Projection compiler boundary.
//!
//! The compiler that turns authored text plus metadata into generated
//! projections is an external collaborator: opaque, possibly expensive,
//! cancelable. The workspace only depends on this trait.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use weft_common::{CommonResult, TextSpan};
use weft_mapping::{
    Diagnostic, GeneratedDocument, ProjectionKind, Severity, SourceMapping,
};
use weft_state::{FileKind, Projections, TagDescriptor};

/// Everything the compiler needs for one document.
#[derive(Debug, Clone)]
pub struct CompileInput {
    pub source_text: Arc<str>,
    pub kind: FileKind,
    pub tags: Arc<Vec<TagDescriptor>>,
    pub root_namespace: Option<String>,
}

#[async_trait]
pub trait ProjectionCompiler: Send + Sync {
    /// Generate both projections for one authored document. A canceled
    /// call may return early; its result is discarded either way.
    async fn generate(
        &self,
        input: CompileInput,
        cancel: CancellationToken,
    ) -> CommonResult<Projections>;
}

/// Deterministic fixture compiler for tests and local tooling: the
/// script projection is the source behind a synthesized prologue, the
/// markup projection is the source verbatim. Sources containing
/// `@error` get one diagnostic.
pub struct IdentityCompiler {
    prologue: &'static str,
}

impl IdentityCompiler {
    pub const PROLOGUE: &'static str = "// <weft:generated>\n";

    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            prologue: Self::PROLOGUE,
        })
    }
}

#[async_trait]
impl ProjectionCompiler for IdentityCompiler {
    async fn generate(
        &self,
        input: CompileInput,
        _cancel: CancellationToken,
    ) -> CommonResult<Projections> {
        let source = input.source_text.clone();
        let len = source.len();

        let script_text: Arc<str> = format!("{}{}", self.prologue, source).into();
        let script_mappings = if len > 0 {
            vec![SourceMapping::new(
                TextSpan::new(0, len),
                TextSpan::new(self.prologue.len(), len),
            )]
        } else {
            Vec::new()
        };

        let markup_mappings = if len > 0 {
            vec![SourceMapping::new(TextSpan::new(0, len), TextSpan::new(0, len))]
        } else {
            Vec::new()
        };

        let diagnostics = if let Some(at) = source.find("@error") {
            vec![Diagnostic {
                severity: Severity::Error,
                message: "unexpected error directive".to_string(),
                span: Some(TextSpan::new(at, "@error".len())),
            }]
        } else {
            Vec::new()
        };

        Ok(Projections {
            script: GeneratedDocument::new(
                ProjectionKind::Script,
                source.clone(),
                script_text,
                script_mappings,
                diagnostics.clone(),
            ),
            markup: GeneratedDocument::new(
                ProjectionKind::Markup,
                source.clone(),
                source,
                markup_mappings,
                diagnostics,
            ),
        })
    }
}
