//! Small pure text helpers: truncation and position arithmetic.
//!
//! Columns are counted in UTF-16 code units, the protocol's default position
//! encoding. For the BMP scripts manuscripts are written in, one code unit is
//! one visible character.

use crate::position::Position;

/// Truncate `raw` to at most `max_chars` characters and append `marker` when
/// anything was cut. The marker does not count toward the budget.
#[must_use]
pub fn truncate_with_marker(raw: &str, max_chars: usize, marker: &str) -> (String, bool) {
    if raw.chars().count() <= max_chars {
        return (raw.to_string(), false);
    }
    let mut head: String = raw.chars().take(max_chars).collect();
    head.push_str(marker);
    (head, true)
}

/// Length of `s` in UTF-16 code units.
#[must_use]
pub fn utf16_len(s: &str) -> u32 {
    s.chars().map(|ch| ch.len_utf16() as u32).sum()
}

/// Convert a UTF-16 column within `line` to a byte offset, clamped to the
/// end of the line. A column landing inside a surrogate pair snaps forward
/// to the next character boundary.
#[must_use]
pub fn utf16_col_to_byte(line: &str, col: u32) -> usize {
    let mut units = 0u32;
    for (idx, ch) in line.char_indices() {
        if units >= col {
            return idx;
        }
        units += ch.len_utf16() as u32;
    }
    line.len()
}

/// Convert a byte offset within `line` to a UTF-16 column.
#[must_use]
pub fn byte_to_utf16_col(line: &str, byte: usize) -> u32 {
    let byte = byte.min(line.len());
    utf16_len(&line[..floor_char_boundary(line, byte)])
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Byte offset of `position` in `content`.
///
/// The offset is the sum of every preceding line's byte length plus one per
/// newline, plus the column converted within the target line. Positions past
/// the end of a line clamp to the line end; lines past the end of the
/// document clamp to the end of the content.
#[must_use]
pub fn offset_at(content: &str, position: Position) -> usize {
    let mut offset = 0usize;
    for (index, line) in content.split('\n').enumerate() {
        if index as u32 == position.line {
            return offset + utf16_col_to_byte(line, position.character);
        }
        offset += line.len() + 1;
    }
    content.len()
}

/// Position of byte `offset` in `content` (clamped to the end).
#[must_use]
pub fn position_at(content: &str, offset: usize) -> Position {
    let offset = floor_char_boundary(content, offset.min(content.len()));
    let before = &content[..offset];
    let line = before.matches('\n').count() as u32;
    let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
    Position::new(line, utf16_len(&before[line_start..]))
}

/// Text of line `line` without its newline, if the line exists.
#[must_use]
pub fn line_text(content: &str, line: u32) -> Option<&str> {
    content.split('\n').nth(line as usize)
}

/// Slice `length` UTF-16 units starting at `position`, if the line exists.
#[must_use]
pub fn slice_at(content: &str, position: Position, length: u32) -> Option<&str> {
    let line = line_text(content, position.line)?;
    let start = utf16_col_to_byte(line, position.character);
    let end = utf16_col_to_byte(line, position.character.saturating_add(length));
    line.get(start..end)
}

/// Whether `s` is empty or whitespace only.
#[must_use]
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
