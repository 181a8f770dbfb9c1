//! Protocol-shaped positions, ranges and locations.

use serde::{Deserialize, Serialize};

/// Zero-based line and UTF-16 column.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open span `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A range covering `length` units on a single line.
    #[must_use]
    pub const fn on_line(line: u32, character: u32, length: u32) -> Self {
        Self {
            start: Position::new(line, character),
            end: Position::new(line, character + length),
        }
    }

    /// Zero-width range at the start of a document.
    #[must_use]
    pub const fn document_start() -> Self {
        Self::on_line(0, 0, 0)
    }

    /// The same range with `start <= end`.
    #[must_use]
    pub fn normalized(self) -> Self {
        if self.end < self.start {
            Self::new(self.end, self.start)
        } else {
            self
        }
    }

    /// Whether two ranges share at least one position. Touching endpoints
    /// count, so a zero-width cursor range at a token edge still selects it.
    #[must_use]
    pub fn intersects(&self, other: &Range) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.start <= b.end && b.start <= a.end
    }
}

/// A range inside a specific document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}
