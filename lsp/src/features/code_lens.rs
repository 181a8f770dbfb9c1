use serde_json::Value;

use super::{DocumentView, ProviderError, REVEAL_ENTITY_COMMAND};
use crate::types::{CodeLens, Command};

/// One lens per detected entity, above its first mention.
pub(super) fn code_lens(view: &DocumentView<'_>) -> Result<Vec<CodeLens>, ProviderError> {
    let matches = view.resolver.detect_all(view.content);
    let mut lenses = Vec::with_capacity(matches.len());
    for m in matches.iter() {
        let Some(first) = m.positions.first() else {
            continue;
        };
        let count = m.positions.len();
        let noun = if count == 1 { "mention" } else { "mentions" };
        let arguments = view
            .definition_location(&m.file_path)?
            .map(|location| vec![Value::String(location.uri)])
            .unwrap_or_default();
        lenses.push(CodeLens {
            range: first.range(),
            command: Some(Command {
                title: format!("{}: {count} {noun}", m.name),
                command: REVEAL_ENTITY_COMMAND.to_string(),
                arguments,
            }),
        });
    }
    lenses.sort_by_key(|lens| lens.range.start);
    Ok(lenses)
}
