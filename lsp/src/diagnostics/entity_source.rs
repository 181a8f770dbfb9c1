use std::path::Path;

use saga_types::text::slice_at;
use saga_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, Location, PositionedMatch, Range,
};

use super::{DiagnosticSource, SourceFut};
use crate::detection::DetectorRegistry;
use crate::protocol::path_to_file_uri;

pub const ENTITY_SOURCE_NAME: &str = "saga";

/// Built-in source: low-confidence entity mentions.
pub struct EntityDiagnosticSource {
    registry: DetectorRegistry,
}

impl EntityDiagnosticSource {
    #[must_use]
    pub fn new(registry: DetectorRegistry) -> Self {
        Self { registry }
    }
}

impl DiagnosticSource for EntityDiagnosticSource {
    fn name(&self) -> &str {
        ENTITY_SOURCE_NAME
    }

    fn is_available(&self) -> SourceFut<'_, bool> {
        Box::pin(async { Ok(true) })
    }

    fn generate<'a>(
        &'a self,
        _uri: &'a str,
        content: &'a str,
        project_root: Option<&'a Path>,
    ) -> SourceFut<'a, Vec<Diagnostic>> {
        Box::pin(async move {
            let Some(root) = project_root else {
                return Ok(Vec::new());
            };
            let Some(detector) = self.registry.get(root) else {
                return Ok(Vec::new());
            };
            let matches = detector.with(|d| d.detect_with_positions(content));
            Ok(entity_diagnostics(&matches, content, Some(root)))
        })
    }
}

/// One diagnostic per occurrence of every match below 0.9 confidence.
///
/// With a project root, each diagnostic links to the defining file.
#[must_use]
pub fn entity_diagnostics(
    matches: &[PositionedMatch],
    content: &str,
    project_root: Option<&Path>,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for m in matches {
        let Some(severity) = DiagnosticSeverity::from_confidence(m.confidence()) else {
            continue;
        };
        let percent = (m.confidence() * 100.0).round() as u32;
        let related = project_root.and_then(|root| definition_link(root, m));
        for position in &m.positions {
            let text = slice_at(content, position.start(), position.length)
                .unwrap_or(m.matched_pattern.as_str());
            let message = format!(
                "\"{text}\" may refer to {} \"{}\" ({percent}% confidence, defined in {})",
                m.kind, m.name, m.file_path
            );
            let mut diagnostic = Diagnostic::new(position.range(), severity, message)
                .with_code(format!("low-confidence-{}", m.kind));
            diagnostic.source = ENTITY_SOURCE_NAME.to_string();
            if let Some(related) = &related {
                diagnostic = diagnostic.with_related(vec![related.clone()]);
            }
            diagnostics.push(diagnostic);
        }
    }
    diagnostics
}

fn definition_link(root: &Path, m: &PositionedMatch) -> Option<DiagnosticRelatedInformation> {
    let uri = path_to_file_uri(&root.join(&m.file_path)).ok()?;
    Some(DiagnosticRelatedInformation {
        location: Location {
            uri: uri.to_string(),
            range: Range::document_start(),
        },
        message: format!("{} \"{}\" is defined here", m.kind, m.name),
    })
}
