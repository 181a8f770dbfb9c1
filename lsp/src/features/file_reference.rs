//! Inline `{file: "<path>"}` references in manuscripts.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use saga_types::text::{byte_to_utf16_col, line_text};
use saga_types::{Position, Range};

use crate::protocol::file_uri_to_path;

static FILE_REFERENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\{\s*file\s*:\s*"([^"\n]+)"\s*\}"#).ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// The path exactly as written.
    pub path: String,
    /// Span of the whole `{file: ...}` token.
    pub range: Range,
}

/// The reference on the cursor's line whose span contains the cursor.
/// Both token edges count, so a cursor right after `}` still resolves.
#[must_use]
pub fn reference_at(content: &str, position: Position) -> Option<FileReference> {
    let regex = FILE_REFERENCE.as_ref()?;
    let line = line_text(content, position.line)?;
    regex.captures_iter(line).find_map(|caps| {
        let whole = caps.get(0)?;
        let path = caps.get(1)?;
        let start = byte_to_utf16_col(line, whole.start());
        let end = byte_to_utf16_col(line, whole.end());
        (start..=end)
            .contains(&position.character)
            .then(|| FileReference {
                path: path.as_str().trim().to_string(),
                range: Range::new(
                    Position::new(position.line, start),
                    Position::new(position.line, end),
                ),
            })
    })
}

/// Resolve a referenced path: absolute paths as-is, relative ones against
/// the project root, or the document's directory when there is no project.
#[must_use]
pub fn resolve_reference(
    reference: &FileReference,
    document_uri: &str,
    project_root: Option<&Path>,
) -> Option<PathBuf> {
    let path = Path::new(&reference.path);
    if path.is_absolute() {
        return Some(path.to_path_buf());
    }
    if let Some(root) = project_root {
        return Some(root.join(path));
    }
    let document = file_uri_to_path(document_uri)?;
    Some(document.parent()?.join(path))
}
