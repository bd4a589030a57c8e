//! Span - Source code location
//!
//! Every syntax node and every operation built from it carries a Span so
//! diagnostics can point back at the declaration file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in the declaration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// Line (1-indexed)
    pub line: u32,
    /// Column (1-indexed)
    pub column: u32,
    /// Byte offset from the beginning of the file
    pub offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

/// A region of the declaration file (start to end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
    /// Compilation unit the span belongs to
    #[serde(default)]
    pub file_id: u32,
}

impl Span {
    pub fn new(start: Position, end: Position, file_id: u32) -> Self {
        Self { start, end, file_id }
    }

    /// Single-line span of `len` bytes starting at `line:column`
    pub fn on_line(line: u32, column: u32, offset: usize, len: usize) -> Self {
        Self {
            start: Position::new(line, column, offset),
            end: Position::new(line, column + len as u32, offset + len),
            file_id: 0,
        }
    }

    /// Combines two spans, creating one that covers both
    pub fn merge(self, other: Span) -> Span {
        debug_assert_eq!(self.file_id, other.file_id, "cannot merge spans from different units");
        Span {
            start: if self.start.offset <= other.start.offset {
                self.start
            } else {
                other.start
            },
            end: if self.end.offset >= other.end.offset {
                self.end
            } else {
                other.end
            },
            file_id: self.file_id,
        }
    }

    /// Whether `other` lies entirely within this span
    pub fn contains(&self, other: &Span) -> bool {
        self.file_id == other.file_id
            && self.start.offset <= other.start.offset
            && other.end.offset <= self.end.offset
    }

    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

/// Types that have a location in the declaration file
pub trait Spanned {
    fn span(&self) -> Span;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        let first = Span::on_line(1, 1, 0, 4);
        let second = Span::on_line(1, 10, 9, 5);

        let merged = first.merge(second);
        assert_eq!(merged.start.offset, 0);
        assert_eq!(merged.end.offset, 14);
        assert!(merged.contains(&first));
        assert!(merged.contains(&second));
    }

    #[test]
    fn test_span_display_uses_start() {
        let span = Span::on_line(3, 7, 40, 2);
        assert_eq!(span.to_string(), "3:7");
        assert_eq!(span.len(), 2);
    }
}
