use std::collections::BTreeMap;

use saga_types::text::{line_text, slice_at, utf16_col_to_byte};
use saga_types::{MatchPosition, Range};

use super::DocumentView;
use crate::types::{CodeAction, TextEdit, WorkspaceEdit};

/// Matches at or below this confidence get an explicit-reference fix.
const FIX_CONFIDENCE_CEILING: f64 = 0.85;

pub(super) fn code_actions(view: &DocumentView<'_>, range: Range) -> Vec<CodeAction> {
    let matches = view.resolver.detect_all(view.content);
    let mut actions = Vec::new();
    for m in matches.iter().filter(|m| m.confidence() <= FIX_CONFIDENCE_CEILING) {
        for position in &m.positions {
            if !position.range().intersects(&range) || preceded_by_at(view.content, position) {
                continue;
            }
            let text = slice_at(view.content, position.start(), position.length)
                .unwrap_or(m.matched_pattern.as_str());
            let edit = TextEdit {
                range: position.range(),
                new_text: format!("@{}", m.id),
            };
            actions.push(CodeAction {
                title: format!("Replace \"{text}\" with explicit reference @{}", m.id),
                kind: "quickfix",
                edit: WorkspaceEdit {
                    changes: BTreeMap::from([(view.uri.to_string(), vec![edit])]),
                },
                is_preferred: true,
            });
        }
    }
    actions
}

fn preceded_by_at(content: &str, position: &MatchPosition) -> bool {
    let Some(line) = line_text(content, position.line) else {
        return false;
    };
    let start = utf16_col_to_byte(line, position.character);
    line[..start].ends_with('@')
}
