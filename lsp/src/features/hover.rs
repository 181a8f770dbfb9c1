use saga_types::text::truncate_with_marker;
use saga_types::{MatchTier, Position};

use super::file_reference::{FileReference, reference_at, resolve_reference};
use super::{DocumentView, ProviderError, ResolvedEntity};
use crate::types::{Hover, MarkupContent};

const TRUNCATION_MARKER: &str = "\n… (truncated)";

pub(super) fn hover(
    view: &DocumentView<'_>,
    position: Position,
    preview_chars: usize,
) -> Result<Option<Hover>, ProviderError> {
    if let Some(reference) = reference_at(view.content, position) {
        return Ok(Some(file_preview(view, &reference, preview_chars)));
    }

    let Some(resolved) = view.resolver.resolve_at_position(view.content, position) else {
        return Ok(None);
    };
    Ok(Some(Hover {
        contents: MarkupContent::markdown(entity_markdown(view, &resolved)),
        range: Some(resolved.span.range()),
    }))
}

fn file_preview(view: &DocumentView<'_>, reference: &FileReference, budget: usize) -> Hover {
    let mut value = format!("**File:** `{}`\n\n", reference.path);
    match resolve_reference(reference, view.uri, view.project_root) {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => {
                let (preview, _) = truncate_with_marker(&text, budget, TRUNCATION_MARKER);
                value.push_str("```\n");
                value.push_str(&preview);
                if !preview.ends_with('\n') {
                    value.push('\n');
                }
                value.push_str("```");
            }
            Err(err) => {
                tracing::debug!("Hover preview of {} failed: {err}", path.display());
                value.push_str(&format!("> **Error:** cannot read `{}`: {err}", path.display()));
            }
        },
        None => value.push_str("> **Error:** cannot resolve this path"),
    }
    Hover {
        contents: MarkupContent::markdown(value),
        range: Some(reference.range),
    }
}

fn entity_markdown(view: &DocumentView<'_>, resolved: &ResolvedEntity) -> String {
    let m = &resolved.matched;
    let percent = (m.confidence() * 100.0).round() as u32;
    let tier = match m.tier {
        MatchTier::Name => "name",
        MatchTier::DisplayName => "display name",
        MatchTier::Alias => "alias",
    };

    let mut value = format!("### {}\n\n", m.name);
    value.push_str(&format!("*{}* · `{}`\n\n", m.kind, m.id));
    value.push_str(&format!(
        "Confidence: {percent}% (matched {tier} \"{}\")\n",
        m.matched_pattern
    ));
    if let Some(status) = m.status {
        value.push_str(&format!("\nStatus: {}\n", status.as_str()));
    }

    if let Some(info) = view.info(&m.key()) {
        if let Some(summary) = &info.summary {
            value.push_str(&format!("\n{}\n", summary.trim()));
        }
        if !info.details.is_empty() {
            value.push('\n');
            for (key, detail) in &info.details {
                value.push_str(&format!("- **{key}**: {detail}\n"));
            }
        }
    }

    value.push_str(&format!("\n---\nDefined in `{}`", m.file_path));
    value
}
