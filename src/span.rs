//! Byte spans into JSON source text.

use core::fmt;

/// Position in the input (byte index)
pub type Pos = usize;

/// A span in the input, with a start position and length
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Span {
    /// Starting position of the span in bytes
    pub start: Pos,
    /// Length of the span in bytes
    pub len: usize,
}

impl Span {
    /// Creates a new span with the given start position and length
    pub fn new(start: Pos, len: usize) -> Self {
        Span { start, len }
    }

    /// Creates a span covering `start..end`.
    pub fn between(start: Pos, end: Pos) -> Self {
        Span {
            start,
            len: end.saturating_sub(start),
        }
    }

    /// End position (start + length)
    pub fn end(&self) -> Pos {
        self.start + self.len
    }

    /// Returns `true` if this span has zero length
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Smallest span containing both `self` and `other`.
    pub fn cover(self, other: Span) -> Span {
        Span::between(self.start.min(other.start), self.end().max(other.end()))
    }

    /// Shifts the span right by `offset` bytes.
    pub(crate) fn shifted(self, offset: usize) -> Span {
        Span::new(self.start + offset, self.len)
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        miette::SourceSpan::new(span.start.into(), span.len)
    }
}

/// A token or value annotated with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    /// The wrapped item
    pub node: T,
    /// Where `node` sits in the source
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Wraps `node` with `span`.
    pub fn new(node: T, span: Span) -> Self {
        Spanned { node, span }
    }
}

impl<T: fmt::Display> fmt::Display for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}..{}", self.node, self.span.start, self.span.end())
    }
}
