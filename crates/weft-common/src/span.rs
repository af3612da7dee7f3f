//! Byte-offset source spans.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A half-open byte range into the original Weft source file.
///
/// The backend never re-reads source text; spans ride along on IR nodes
/// so translation errors can point back at the construct that produced
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// A zero-width span for synthesized nodes with no source position.
    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// A zero-width span at the start of this one.
    pub fn left_edge(self) -> Span {
        Span::new(self.start, self.start)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_takes_extremes() {
        let a = Span::new(4, 10);
        let b = Span::new(7, 20);
        assert_eq!(a.cover(b), Span::new(4, 20));
        assert_eq!(b.cover(a), Span::new(4, 20));
    }

    #[test]
    fn display_is_range_like() {
        assert_eq!(Span::new(1, 5).to_string(), "1..5");
    }
}
