use saga_types::{Location, Position, Range};

use super::file_reference::{reference_at, resolve_reference};
use super::{DocumentView, ProviderError};
use crate::protocol::path_to_file_uri;

/// Inline file references win over entity mentions.
pub(super) fn definition(
    view: &DocumentView<'_>,
    position: Position,
) -> Result<Option<Location>, ProviderError> {
    if let Some(reference) = reference_at(view.content, position) {
        let Some(path) = resolve_reference(&reference, view.uri, view.project_root) else {
            return Ok(None);
        };
        let uri = path_to_file_uri(&path)?;
        return Ok(Some(Location {
            uri: uri.to_string(),
            range: Range::document_start(),
        }));
    }

    let Some(resolved) = view.resolver.resolve_at_position(view.content, position) else {
        return Ok(None);
    };
    view.definition_location(&resolved.matched.file_path)
}
