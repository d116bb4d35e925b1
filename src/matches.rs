use serde::Serialize;
use std::ops::Range;
use std::path::PathBuf;

/// A half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<Range<usize>> for Span {
    fn from(r: Range<usize>) -> Self {
        Self::new(r.start, r.end)
    }
}

/// 1-based line numbers, `first` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LineSpan {
    pub first: usize,
    pub end: usize,
}

impl LineSpan {
    pub fn new(first: usize, end: usize) -> Self {
        Self { first, end }
    }
}

/// Where one occurrence sits inside a channel value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    /// The line(s) containing the occurrence, without surrounding terminators.
    pub line: String,
    pub line_span: LineSpan,
    /// Absolute offsets in the channel value.
    pub match_span: Span,
    /// Offsets relative to the start of `line`.
    pub local_span: Span,
}

impl Occurrence {
    /// The occurrence text as it appears in `line`.
    pub fn matched(&self) -> &str {
        &self.line[self.local_span.range()]
    }
}

/// One result of a find or a replacement preview.
///
/// `occurrence` is `None` for a file accepted by a `NotExists` search: the
/// file qualifies, but there is nothing in it to point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub file_index: usize,
    pub path: PathBuf,
    pub occurrence: Option<Occurrence>,
}

impl MatchRecord {
    pub fn is_null(&self) -> bool {
        self.occurrence.is_none()
    }

    pub fn line(&self) -> Option<&str> {
        self.occurrence.as_ref().map(|o| o.line.as_str())
    }

    pub fn line_span(&self) -> Option<LineSpan> {
        self.occurrence.as_ref().map(|o| o.line_span)
    }

    pub fn match_span(&self) -> Option<Span> {
        self.occurrence.as_ref().map(|o| o.match_span)
    }

    pub fn local_span(&self) -> Option<Span> {
        self.occurrence.as_ref().map(|o| o.local_span)
    }
}
