//! Open-document store with full and incremental synchronization.

use std::collections::HashMap;

use saga_types::text::offset_at;

use crate::types::TextDocumentContentChangeEvent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("document not open: {uri}")]
    NotFound { uri: String },
}

/// Snapshot of one open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    pub uri: String,
    pub content: String,
    pub version: i32,
    pub language_id: String,
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<String, TextDocument>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reopen) a document, replacing any previous snapshot.
    pub fn open(
        &mut self,
        uri: impl Into<String>,
        content: impl Into<String>,
        version: i32,
        language_id: impl Into<String>,
    ) -> &TextDocument {
        let uri = uri.into();
        let document = TextDocument {
            uri: uri.clone(),
            content: content.into(),
            version,
            language_id: language_id.into(),
        };
        tracing::debug!(uri = %uri, version, "Opened document");
        self.documents.insert(uri.clone(), document);
        &self.documents[&uri]
    }

    /// Apply `changes` in order, each against the content left by the
    /// previous one.
    pub fn change(
        &mut self,
        uri: &str,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<&TextDocument, DocumentError> {
        let document = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| DocumentError::NotFound {
                uri: uri.to_string(),
            })?;
        for change in changes {
            apply_change(&mut document.content, change);
        }
        document.version = version;
        Ok(&*document)
    }

    pub fn close(&mut self, uri: &str) -> Option<TextDocument> {
        self.documents.remove(uri)
    }

    pub fn get(&self, uri: &str) -> Result<&TextDocument, DocumentError> {
        self.documents
            .get(uri)
            .ok_or_else(|| DocumentError::NotFound {
                uri: uri.to_string(),
            })
    }

    /// Open document URIs in a stable order.
    #[must_use]
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.documents.keys().cloned().collect();
        uris.sort();
        uris
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn apply_change(content: &mut String, change: &TextDocumentContentChangeEvent) {
    let Some(range) = change.range else {
        content.clone_from(&change.text);
        return;
    };
    let range = range.normalized();
    let start = offset_at(content, range.start);
    let end = offset_at(content, range.end).max(start);
    content.replace_range(start..end, &change.text);
}

#[cfg(test)]
mod tests {
    use saga_types::{Position, Range};

    use super::{DocumentError, DocumentStore};
    use crate::types::TextDocumentContentChangeEvent;

    const URI: &str = "file:///novel/chapter1.md";

    #[test]
    fn full_change_round_trips_text() {
        let mut store = DocumentStore::new();
        store.open(URI, "旧い本文", 1, "markdown");
        let text = "勇者は剣を抜いた。\n魔王が笑った。";
        let doc = store
            .change(URI, &[TextDocumentContentChangeEvent::full(text)], 2)
            .unwrap();
        assert_eq!(doc.content, text);
        assert_eq!(doc.version, 2);
    }

    #[test]
    fn ranged_edits_apply_in_order() {
        let mut store = DocumentStore::new();
        store.open(URI, "ab\ncd\nef", 1, "markdown");
        let changes = [
            // "cd" -> "XYZ"
            TextDocumentContentChangeEvent::ranged(
                Range::new(Position::new(1, 0), Position::new(1, 2)),
                "XYZ",
            ),
            // Offsets now refer to the edited text: insert after "XYZ".
            TextDocumentContentChangeEvent::ranged(
                Range::new(Position::new(1, 3), Position::new(1, 3)),
                "!",
            ),
        ];
        let doc = store.change(URI, &changes, 2).unwrap();
        assert_eq!(doc.content, "ab\nXYZ!\nef");
    }

    #[test]
    fn multi_line_range_splices_newlines() {
        let mut store = DocumentStore::new();
        store.open(URI, "一行目\n二行目\n三行目", 1, "markdown");
        let doc = store
            .change(
                URI,
                &[TextDocumentContentChangeEvent::ranged(
                    Range::new(Position::new(0, 2), Position::new(2, 1)),
                    "",
                )],
                2,
            )
            .unwrap();
        assert_eq!(doc.content, "一行行目");
    }

    #[test]
    fn incremental_matches_full_replacement() {
        let original = "勇者は剣を抜いた。";
        let mut incremental = DocumentStore::new();
        incremental.open(URI, original, 1, "markdown");
        incremental
            .change(
                URI,
                &[TextDocumentContentChangeEvent::ranged(
                    Range::new(Position::new(0, 3), Position::new(0, 4)),
                    "聖剣",
                )],
                2,
            )
            .unwrap();

        let mut full = DocumentStore::new();
        full.open(URI, original, 1, "markdown");
        full.change(
            URI,
            &[TextDocumentContentChangeEvent::full("勇者は聖剣を抜いた。")],
            2,
        )
        .unwrap();

        assert_eq!(
            incremental.get(URI).unwrap().content,
            full.get(URI).unwrap().content
        );
    }

    #[test]
    fn out_of_bounds_positions_clamp() {
        let mut store = DocumentStore::new();
        store.open(URI, "abc\ndef", 1, "markdown");
        let doc = store
            .change(
                URI,
                &[TextDocumentContentChangeEvent::ranged(
                    Range::new(Position::new(0, 99), Position::new(9, 0)),
                    "!",
                )],
                2,
            )
            .unwrap();
        assert_eq!(doc.content, "abc!");
    }

    #[test]
    fn change_on_unknown_document_is_not_found() {
        let mut store = DocumentStore::new();
        let err = store
            .change(URI, &[TextDocumentContentChangeEvent::full("x")], 1)
            .unwrap_err();
        assert_eq!(
            err,
            DocumentError::NotFound {
                uri: URI.to_string()
            }
        );
    }

    #[test]
    fn close_destroys_snapshot() {
        let mut store = DocumentStore::new();
        store.open(URI, "text", 1, "markdown");
        assert!(store.close(URI).is_some());
        assert!(store.get(URI).is_err());
        assert!(store.is_empty());
    }
}
