//! Line and span extraction shared by the finder and the replacer.
//!
//! `\n`, `\r` and `\r\n` all terminate a line; `\r\n` counts as a single
//! terminator. All offsets are byte offsets, which is safe because every
//! terminator is ASCII.

use crate::matches::{LineSpan, Occurrence, Span};

fn is_terminator(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// Counts line terminators in `bytes[..end]`, treating `\r\n` as one.
///
/// A `\r` at `end - 1` that is followed by `\n` in `bytes` is not counted:
/// the terminator it starts has not been crossed yet.
fn terminators_before(bytes: &[u8], end: usize) -> usize {
    let mut count = 0;
    for (i, &b) in bytes[..end].iter().enumerate() {
        match b {
            b'\n' => count += 1,
            b'\r' if bytes.get(i + 1) != Some(&b'\n') => count += 1,
            _ => {}
        }
    }
    count
}

/// Number of lines `s` spans on its own, at least one.
fn lines_covered(s: &str) -> usize {
    let bytes = s.as_bytes();
    let terminators = terminators_before(bytes, bytes.len());
    let tail = bytes.last().is_some_and(|&b| !is_terminator(b));
    (terminators + usize::from(tail)).max(1)
}

/// Locates the occurrence at `span` in `text` and renders its line with
/// `inserted` spliced in place of `text[span]`.
///
/// The returned line runs from the terminator before `span.start` to the
/// terminator after `span.end`. When the spliced text itself ends with a
/// terminator, no trailing context is appended: the next line belongs to
/// the next line number.
pub fn extract(text: &str, span: Span, inserted: &str) -> Occurrence {
    let bytes = text.as_bytes();

    let line_start = bytes[..span.start]
        .iter()
        .rposition(|&b| is_terminator(b))
        .map_or(0, |i| i + 1);

    let ends_with_terminator = inserted.as_bytes().last().is_some_and(|&b| is_terminator(b));
    let line_end = if ends_with_terminator {
        span.end
    } else {
        bytes[span.end..]
            .iter()
            .position(|&b| is_terminator(b))
            .map_or(bytes.len(), |i| span.end + i)
    };

    let mut line = String::with_capacity(line_end - line_start - span.len() + inserted.len());
    line.push_str(&text[line_start..span.start]);
    line.push_str(inserted);
    line.push_str(&text[span.end..line_end]);

    let first = terminators_before(bytes, span.start) + 1;
    let local_start = span.start - line_start;

    Occurrence {
        line,
        line_span: LineSpan::new(first, first + lines_covered(inserted)),
        match_span: span,
        local_span: Span::new(local_start, local_start + inserted.len()),
    }
}
