use saga_types::text::{line_text, utf16_col_to_byte};
use saga_types::{DetectableEntity, Position};

use super::DocumentView;
use crate::types::{CompletionItem, CompletionItemKind};

/// After `@`, entity ids; elsewhere, names and display names.
pub(super) fn completion(view: &DocumentView<'_>, position: Position) -> Vec<CompletionItem> {
    let entities = view.resolver.entities();
    let mut items = if after_at_sign(view.content, position) {
        entities.iter().map(reference_item).collect::<Vec<_>>()
    } else {
        entities.iter().flat_map(name_items).collect()
    };
    items.sort_by(|a, b| a.sort_text.cmp(&b.sort_text));
    items.dedup_by(|a, b| a.label == b.label && a.detail == b.detail);
    items
}

fn after_at_sign(content: &str, position: Position) -> bool {
    let Some(line) = line_text(content, position.line) else {
        return false;
    };
    let cursor = utf16_col_to_byte(line, position.character);
    line[..cursor].ends_with('@')
}

fn reference_item(entity: &DetectableEntity) -> CompletionItem {
    CompletionItem {
        label: format!("@{}", entity.id),
        kind: CompletionItemKind::Reference,
        detail: format!("{} · {}", entity.kind, entity.name),
        insert_text: entity.id.clone(),
        sort_text: format!("{}:{}", entity.kind.index(), entity.id),
    }
}

fn name_items(entity: &DetectableEntity) -> Vec<CompletionItem> {
    std::iter::once(&entity.name)
        .chain(entity.display_names.iter())
        .filter(|name| !name.is_empty())
        .map(|name| CompletionItem {
            label: name.clone(),
            kind: CompletionItemKind::Text,
            detail: entity.kind.to_string(),
            insert_text: name.clone(),
            sort_text: format!("{}:{name}", entity.kind.index()),
        })
        .collect()
}
