//! Position and range mapping between authored and generated documents.

use weft_common::{offset_to_position, Position, TextSpan};

use crate::document::{GeneratedDocument, SourceMapping};

/// Contract governing how a queried range must relate to the mapping
/// table for `map_range_to_host` to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingBehavior {
    /// Both endpoints must land in the same single mapping entry.
    Strict,
    /// Endpoints may sit on a mapping's edge; the range may spill past
    /// the mapping on at most one side, and must touch exactly one
    /// mapping.
    Inclusive,
    /// Like `Inclusive`, but a range lying entirely in the gap between
    /// mappings snaps to the enclosing authored-document gap.
    Inferred,
}

/// Map an authored-document offset into the generated document.
///
/// Returns the generated position and offset, or `None` when no mapping's
/// original span contains the offset.
pub fn map_to_generated(doc: &GeneratedDocument, host_offset: usize) -> Option<(Position, usize)> {
    let mapping = doc
        .mappings
        .iter()
        .find(|m| m.original.contains(host_offset))?;

    let generated_offset = mapping.generated.offset + (host_offset - mapping.original.offset);
    Some((offset_to_position(&doc.text, generated_offset), generated_offset))
}

/// Map a generated-document offset back into the authored document.
pub fn map_to_host(doc: &GeneratedDocument, generated_offset: usize) -> Option<(Position, usize)> {
    let mapping = doc
        .mappings
        .iter()
        .find(|m| m.generated.contains(generated_offset))?;

    let host_offset = mapping.original.offset + (generated_offset - mapping.generated.offset);
    Some((offset_to_position(&doc.source_text, host_offset), host_offset))
}

/// Map a generated-document range back into the authored document under
/// the given behavior contract. Returns the authored span, or `None`
/// when the contract is not met.
pub fn map_range_to_host(
    doc: &GeneratedDocument,
    generated_range: TextSpan,
    behavior: MappingBehavior,
) -> Option<TextSpan> {
    match behavior {
        MappingBehavior::Strict => map_range_strict(doc, generated_range),
        MappingBehavior::Inclusive => map_range_inclusive(doc, generated_range),
        MappingBehavior::Inferred => map_range_inclusive(doc, generated_range)
            .or_else(|| map_range_inferred(doc, generated_range)),
    }
}

fn map_range_strict(doc: &GeneratedDocument, range: TextSpan) -> Option<TextSpan> {
    // Both endpoints must resolve inside the same entry. The range end is
    // exclusive, so it is allowed to sit exactly on the mapping's end.
    let mapping = doc.mappings.iter().find(|m| {
        m.generated.contains_inclusive(range.offset) && m.generated.contains_inclusive(range.end())
    })?;

    Some(project_into_host(mapping, range))
}

fn map_range_inclusive(doc: &GeneratedDocument, range: TextSpan) -> Option<TextSpan> {
    if range.len == 0 {
        // A caret position maps through whichever entry admits it,
        // boundary included.
        let mapping = doc
            .mappings
            .iter()
            .find(|m| m.generated.contains_inclusive(range.offset))?;
        return Some(project_into_host(mapping, range));
    }

    let mut overlapping = doc.mappings.iter().filter(|m| m.generated.overlaps(&range));

    let mapping = overlapping.next()?;
    if overlapping.next().is_some() {
        // Doubly intersects: the range straddles two distinct mappings.
        return None;
    }

    let spills_before = range.offset < mapping.generated.offset;
    let spills_after = range.end() > mapping.generated.end();
    if spills_before && spills_after {
        // Edge overlap is permitted on one side only.
        return None;
    }

    let clamped = TextSpan::new(
        range.offset.max(mapping.generated.offset),
        range.end().min(mapping.generated.end()) - range.offset.max(mapping.generated.offset),
    );
    Some(project_into_host(mapping, clamped))
}

fn map_range_inferred(doc: &GeneratedDocument, range: TextSpan) -> Option<TextSpan> {
    // Only ranges lying entirely between mappings (no overlap with any
    // entry) are eligible here; everything else already failed Inclusive
    // for a reason that Inferred does not forgive.
    if doc.mappings.is_empty() {
        return None;
    }
    if doc
        .mappings
        .iter()
        .any(|m| m.generated.overlaps(&range) || (range.len == 0 && m.generated.contains_inclusive(range.offset)))
    {
        return None;
    }

    let preceding = doc
        .mappings
        .iter()
        .filter(|m| m.generated.end() <= range.offset)
        .last();
    let following = doc
        .mappings
        .iter()
        .find(|m| m.generated.offset >= range.end());

    match (preceding, following) {
        (Some(prev), Some(next)) => {
            // Snap to the authored gap between the two entries.
            let start = prev.original.end();
            let end = next.original.offset;
            Some(TextSpan::new(start, end.saturating_sub(start)))
        }
        (Some(prev), None) => {
            // Between the last mapping and document end.
            let start = prev.original.end();
            let end = doc.source_text.len();
            Some(TextSpan::new(start, end.saturating_sub(start)))
        }
        (None, Some(next)) => {
            // Document-start gap. Generated text before the first mapping
            // with no authored counterpart is synthesized prologue.
            if next.original.offset == 0 {
                return None;
            }
            Some(TextSpan::new(0, next.original.offset))
        }
        (None, None) => None,
    }
}

fn project_into_host(mapping: &SourceMapping, generated: TextSpan) -> TextSpan {
    let offset = mapping.original.offset + (generated.offset - mapping.generated.offset);
    TextSpan::new(offset, generated.len)
}
