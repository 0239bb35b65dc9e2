//! Minimal text edit scripts.
//!
//! The diff runs at line granularity (longest common subsequence over
//! lines), then trims each changed run down to the characters that
//! actually differ. Contiguous unchanged regions never appear in the
//! output.

use weft_common::TextSpan;

/// One replace operation: delete `span` from the previous text and put
/// `new_text` in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub span: TextSpan,
    pub new_text: String,
}

impl TextEdit {
    pub fn new(span: TextSpan, new_text: impl Into<String>) -> Self {
        Self {
            span,
            new_text: new_text.into(),
        }
    }
}

/// Compute the ordered edit script transforming `old` into `new`.
/// Returns an empty script when the texts are equal.
pub fn compute_edits(old: &str, new: &str) -> Vec<TextEdit> {
    if old == new {
        return Vec::new();
    }

    let old_lines = line_spans(old);
    let new_lines = line_spans(new);
    let old_slices: Vec<&str> = old_lines.iter().map(|s| slice(old, s)).collect();
    let new_slices: Vec<&str> = new_lines.iter().map(|s| slice(new, s)).collect();

    let table = lcs_table(&old_slices, &new_slices);

    let mut edits = Vec::new();
    let (n, m) = (old_slices.len(), new_slices.len());
    let (mut i, mut j) = (0usize, 0usize);
    let mut run: Option<(usize, usize)> = None;

    while i < n || j < m {
        let matching = i < n && j < m && old_slices[i] == new_slices[j];
        if matching {
            if let Some((run_i, run_j)) = run.take() {
                edits.push(run_edit(old, &old_lines, run_i..i, new, &new_lines, run_j..j));
            }
            i += 1;
            j += 1;
        } else {
            if run.is_none() {
                run = Some((i, j));
            }
            if i < n && (j >= m || table[i + 1][j] >= table[i][j + 1]) {
                i += 1;
            } else {
                j += 1;
            }
        }
    }
    if let Some((run_i, run_j)) = run {
        edits.push(run_edit(old, &old_lines, run_i..i, new, &new_lines, run_j..j));
    }

    edits
}

fn slice<'a>(text: &'a str, span: &TextSpan) -> &'a str {
    &text[span.offset..span.end()]
}

/// Line spans including terminators; a trailing newline does not create
/// an empty final line.
fn line_spans(text: &str) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (idx, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            spans.push(TextSpan::new(start, idx + 1 - start));
            start = idx + 1;
        }
    }
    if start < text.len() {
        spans.push(TextSpan::new(start, text.len() - start));
    }
    spans
}

/// Suffix LCS table over line slices: `table[i][j]` is the LCS length of
/// `a[i..]` and `b[j..]`.
fn lcs_table(a: &[&str], b: &[&str]) -> Vec<Vec<u32>> {
    let (n, m) = (a.len(), b.len());
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    table
}

/// Turn one run of differing lines into a single edit, trimmed at char
/// granularity so only the genuinely differing middle is replaced.
fn run_edit(
    old: &str,
    old_lines: &[TextSpan],
    old_range: std::ops::Range<usize>,
    new: &str,
    new_lines: &[TextSpan],
    new_range: std::ops::Range<usize>,
) -> TextEdit {
    let old_span = range_span(old, old_lines, &old_range);
    let new_span = range_span(new, new_lines, &new_range);

    let old_text = &old[old_span.offset..old_span.end()];
    let new_text = &new[new_span.offset..new_span.end()];

    let prefix = common_prefix(old_text, new_text);
    let max_suffix = old_text.len().min(new_text.len()) - prefix;
    let suffix = common_suffix(&old_text[prefix..], &new_text[prefix..]).min(max_suffix);

    TextEdit::new(
        TextSpan::new(
            old_span.offset + prefix,
            old_text.len() - prefix - suffix,
        ),
        &new_text[prefix..new_text.len() - suffix],
    )
}

fn range_span(text: &str, lines: &[TextSpan], range: &std::ops::Range<usize>) -> TextSpan {
    if range.is_empty() {
        let offset = lines
            .get(range.start)
            .map(|s| s.offset)
            .unwrap_or(text.len());
        return TextSpan::new(offset, 0);
    }
    let start = lines[range.start].offset;
    let end = lines[range.end - 1].end();
    TextSpan::new(start, end - start)
}

fn common_prefix(a: &str, b: &str) -> usize {
    let mut len = 0;
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca != cb {
            break;
        }
        len += ca.len_utf8();
    }
    len
}

fn common_suffix(a: &str, b: &str) -> usize {
    let mut len = 0;
    for (ca, cb) in a.chars().rev().zip(b.chars().rev()) {
        if ca != cb {
            break;
        }
        len += ca.len_utf8();
    }
    len
}

/// Apply an edit script; used by tests and by channel fakes to verify
/// the client-side text converges.
pub fn apply_edits(old: &str, edits: &[TextEdit]) -> String {
    let mut result = String::new();
    let mut cursor = 0;
    for edit in edits {
        result.push_str(&old[cursor..edit.span.offset]);
        result.push_str(&edit.new_text);
        cursor = edit.span.end();
    }
    result.push_str(&old[cursor..]);
    result
}
