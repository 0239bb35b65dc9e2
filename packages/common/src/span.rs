//! Span and position primitives shared by every weft package.
//!
//! All offsets are byte offsets into the document text. Positions are
//! derived (0-indexed line/character) and only computed at the edges,
//! where an editor-facing payload needs them.

use serde::{Deserialize, Serialize};

/// Contiguous region of a document, `[offset, offset + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    pub offset: usize,
    pub len: usize,
}

impl TextSpan {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Exclusive end offset.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// True if `offset` falls strictly inside the span's half-open range.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.offset && offset < self.end()
    }

    /// True if `offset` falls inside the span or exactly on either edge.
    pub fn contains_inclusive(&self, offset: usize) -> bool {
        offset >= self.offset && offset <= self.end()
    }

    /// True if the two spans share at least one offset.
    pub fn overlaps(&self, other: &TextSpan) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// 0-indexed line/character coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Position pair describing an editor-facing range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}
