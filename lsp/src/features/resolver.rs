//! Shared access to detection results for feature providers.

use std::sync::Arc;

use saga_types::text::is_blank;
use saga_types::{DetectableEntity, MatchPosition, Position, PositionedMatch};

use crate::detection::SharedDetector;

/// An entity occurrence under the cursor.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub matched: PositionedMatch,
    pub span: MatchPosition,
}

/// Resolves entities in document content. Without a detector (no project)
/// every lookup is empty.
#[derive(Clone, Default)]
pub struct EntityResolver {
    detector: Option<SharedDetector>,
}

impl EntityResolver {
    #[must_use]
    pub fn new(detector: Option<SharedDetector>) -> Self {
        Self { detector }
    }

    #[must_use]
    pub fn resolve_at_position(&self, content: &str, position: Position) -> Option<ResolvedEntity> {
        if is_blank(content) {
            return None;
        }
        let detector = self.detector.as_ref()?;
        detector
            .with(|d| d.entity_at_position(content, position))
            .map(|(matched, span)| ResolvedEntity { matched, span })
    }

    #[must_use]
    pub fn detect_all(&self, content: &str) -> Arc<[PositionedMatch]> {
        match &self.detector {
            Some(detector) if !is_blank(content) => {
                detector.with(|d| d.detect_with_positions(content))
            }
            _ => Arc::from(Vec::new()),
        }
    }

    /// Every registered entity, for completion.
    #[must_use]
    pub fn entities(&self) -> Vec<DetectableEntity> {
        self.detector
            .as_ref()
            .map(|detector| detector.with(|d| d.entities().to_vec()))
            .unwrap_or_default()
    }
}
