//! Language ownership classification at a document offset.
//!
//! The authored document interleaves three languages: templating
//! directives, embedded script, and markup. Feature endpoints ask which
//! language owns a caret offset so they can route the request to the
//! right projection.

use weft_common::TextSpan;

/// Language owning a region of the authored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageKind {
    /// Templating directives and transitions.
    TemplateMeta,
    /// Embedded procedural script.
    Script,
    /// Markup content.
    Markup,
}

/// A lexical span tagged with the language that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedSpan {
    pub span: TextSpan,
    pub language: LanguageKind,
}

impl ClassifiedSpan {
    pub fn new(span: TextSpan, language: LanguageKind) -> Self {
        Self { span, language }
    }
}

/// A structural element region (tag structure). Structural spans enclose
/// classified spans and always belong to markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralSpan {
    pub span: TextSpan,
}

impl StructuralSpan {
    pub fn new(span: TextSpan) -> Self {
        Self { span }
    }
}

/// Determine which language owns `offset`.
///
/// Classified spans are consulted first, preferring the smallest span
/// that owns the offset, then structural spans. An offset sitting on a span
/// boundary is owned by the preceding span when `right_associative` is
/// false and by the following span when it is true, except at document
/// end where the last span always wins. With no owning span the offset
/// belongs to the templating meta-language.
pub fn classify_at(
    classified_spans: &[ClassifiedSpan],
    structural_spans: &[StructuralSpan],
    offset: usize,
    document_len: usize,
    right_associative: bool,
) -> LanguageKind {
    if offset == document_len {
        if let Some(last) = classified_spans.last() {
            if last.span.contains_inclusive(offset) {
                return last.language;
            }
        }
    }

    // Spans may nest; the smallest owner is the most specific one.
    if let Some(owner) = classified_spans
        .iter()
        .filter(|classified| owns(classified.span, offset, right_associative))
        .min_by_key(|classified| classified.span.len)
    {
        return owner.language;
    }

    if structural_spans
        .iter()
        .any(|structural| owns(structural.span, offset, right_associative))
    {
        return LanguageKind::Markup;
    }

    LanguageKind::TemplateMeta
}

/// Boundary ownership: right-associative offsets bind to the span that
/// starts at them, left-associative to the span that ends at them.
fn owns(span: TextSpan, offset: usize, right_associative: bool) -> bool {
    if right_associative {
        offset >= span.offset && offset < span.end()
    } else {
        offset > span.offset && offset <= span.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "@{ let x }<div>text</div>"-shaped layout:
    //   [0,2)   template transition
    //   [2,10)  script block
    //   [10,25) markup
    fn spans() -> Vec<ClassifiedSpan> {
        vec![
            ClassifiedSpan::new(TextSpan::new(0, 2), LanguageKind::TemplateMeta),
            ClassifiedSpan::new(TextSpan::new(2, 8), LanguageKind::Script),
            ClassifiedSpan::new(TextSpan::new(10, 15), LanguageKind::Markup),
        ]
    }

    #[test]
    fn test_interior_offsets_ignore_associativity() {
        for right in [false, true] {
            assert_eq!(classify_at(&spans(), &[], 5, 25, right), LanguageKind::Script);
            assert_eq!(classify_at(&spans(), &[], 12, 25, right), LanguageKind::Markup);
        }
    }

    #[test]
    fn test_boundary_left_associative_picks_preceding() {
        let kind = classify_at(&spans(), &[], 10, 25, false);
        assert_eq!(kind, LanguageKind::Script);
    }

    #[test]
    fn test_boundary_right_associative_picks_following() {
        let kind = classify_at(&spans(), &[], 10, 25, true);
        assert_eq!(kind, LanguageKind::Markup);
    }

    #[test]
    fn test_document_end_always_owned_by_last_span() {
        assert_eq!(classify_at(&spans(), &[], 25, 25, false), LanguageKind::Markup);
        assert_eq!(classify_at(&spans(), &[], 25, 25, true), LanguageKind::Markup);
    }

    #[test]
    fn test_unowned_offset_defaults_to_template_meta() {
        let sparse = vec![ClassifiedSpan::new(TextSpan::new(5, 3), LanguageKind::Script)];
        assert_eq!(classify_at(&sparse, &[], 2, 20, true), LanguageKind::TemplateMeta);
    }

    #[test]
    fn test_structural_span_claims_offset_for_markup() {
        let sparse = vec![ClassifiedSpan::new(TextSpan::new(0, 4), LanguageKind::TemplateMeta)];
        let structural = vec![StructuralSpan::new(TextSpan::new(6, 10))];
        assert_eq!(
            classify_at(&sparse, &structural, 8, 20, true),
            LanguageKind::Markup
        );
    }

    #[test]
    fn test_nested_spans_smallest_owner_wins() {
        // A script island nested inside a markup region: the inner span
        // owns its interior no matter how the spans are ordered.
        let nested = vec![
            ClassifiedSpan::new(TextSpan::new(0, 20), LanguageKind::Markup),
            ClassifiedSpan::new(TextSpan::new(5, 5), LanguageKind::Script),
        ];
        let mut reversed = nested.clone();
        reversed.reverse();

        for right in [false, true] {
            assert_eq!(classify_at(&nested, &[], 7, 20, right), LanguageKind::Script);
            assert_eq!(classify_at(&reversed, &[], 7, 20, right), LanguageKind::Script);
        }
    }

    #[test]
    fn test_classification_is_deterministic() {
        for offset in 0..=25 {
            for right in [false, true] {
                let first = classify_at(&spans(), &[], offset, 25, right);
                let second = classify_at(&spans(), &[], offset, 25, right);
                assert_eq!(first, second);
            }
        }
    }
}
