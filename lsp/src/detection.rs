//! Position-tracked entity detection.
//!
//! [`EntityDetector`] scans a content snapshot for every registered entity's
//! name, display names and aliases. Results are memoized per content
//! string; any other content, or any change to the registered set, drops
//! the memo.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use saga_types::text::{byte_to_utf16_col, utf16_len};
use saga_types::{
    DetectableEntity, EntityKey, MatchPosition, MatchTier, Position, PositionedMatch,
};

struct DetectionCache {
    content: String,
    matches: Arc<[PositionedMatch]>,
}

pub struct EntityDetector {
    entities: Vec<DetectableEntity>,
    cache: Option<DetectionCache>,
}

impl EntityDetector {
    #[must_use]
    pub fn new(entities: Vec<DetectableEntity>) -> Self {
        Self {
            entities,
            cache: None,
        }
    }

    #[must_use]
    pub fn entities(&self) -> &[DetectableEntity] {
        &self.entities
    }

    /// All matches in `content`, one per entity, in registration order.
    pub fn detect_with_positions(&mut self, content: &str) -> Arc<[PositionedMatch]> {
        if let Some(cache) = &self.cache
            && cache.content == content
        {
            return Arc::clone(&cache.matches);
        }
        let matches: Arc<[PositionedMatch]> = scan(&self.entities, content).into();
        self.cache = Some(DetectionCache {
            content: content.to_string(),
            matches: Arc::clone(&matches),
        });
        matches
    }

    /// The first match whose span contains `position`, with that span.
    pub fn entity_at_position(
        &mut self,
        content: &str,
        position: Position,
    ) -> Option<(PositionedMatch, MatchPosition)> {
        let matches = self.detect_with_positions(content);
        matches.iter().find_map(|m| {
            m.position_containing(position)
                .map(|span| (m.clone(), *span))
        })
    }

    /// Replace the registered set.
    pub fn update_entities(&mut self, entities: Vec<DetectableEntity>) {
        self.entities = entities;
        self.cache = None;
    }

    /// Insert or replace one entity, keyed by `(kind, id)`.
    pub fn update_single_entity(&mut self, entity: DetectableEntity) {
        let key = entity.key();
        match self.entities.iter_mut().find(|e| e.key() == key) {
            Some(existing) => *existing = entity,
            None => self.entities.push(entity),
        }
        self.cache = None;
    }

    /// Drop every entity defined in `file_path`. Returns how many were
    /// removed.
    pub fn remove_entities_for_file(&mut self, file_path: &str) -> usize {
        let before = self.entities.len();
        self.entities.retain(|e| e.file_path != file_path);
        let removed = before - self.entities.len();
        if removed > 0 {
            self.cache = None;
        }
        removed
    }

    pub fn remove_entity(&mut self, key: &EntityKey) -> bool {
        let before = self.entities.len();
        self.entities.retain(|e| e.key() != *key);
        let removed = before != self.entities.len();
        if removed {
            self.cache = None;
        }
        removed
    }
}

fn scan(entities: &[DetectableEntity], content: &str) -> Vec<PositionedMatch> {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut matches = Vec::new();

    for entity in entities {
        let mut best: Option<(MatchTier, &str)> = None;
        let mut positions = Vec::new();

        for (pattern, tier) in entity.patterns() {
            let length = utf16_len(pattern);
            let mut found = false;
            for (line_idx, line) in lines.iter().enumerate() {
                for (byte, _) in line.match_indices(pattern) {
                    positions.push(MatchPosition::new(
                        line_idx as u32,
                        byte_to_utf16_col(line, byte),
                        length,
                    ));
                    found = true;
                }
            }
            if found && best.is_none_or(|(seen, _)| tier > seen) {
                best = Some((tier, pattern));
            }
        }

        let Some((tier, pattern)) = best else {
            continue;
        };
        // Stable sort keeps the higher-tier pattern first among equal starts.
        positions.sort_by_key(|p| (p.line, p.character));
        positions.dedup_by_key(|p| (p.line, p.character));

        matches.push(PositionedMatch {
            kind: entity.kind,
            id: entity.id.clone(),
            name: entity.name.clone(),
            file_path: entity.file_path.clone(),
            matched_pattern: pattern.to_string(),
            positions,
            tier,
            status: entity.status,
        });
    }
    matches
}

/// A detector shared between the request loop and diagnostic sources.
#[derive(Clone)]
pub struct SharedDetector(Arc<Mutex<EntityDetector>>);

impl SharedDetector {
    #[must_use]
    pub fn new(detector: EntityDetector) -> Self {
        Self(Arc::new(Mutex::new(detector)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut EntityDetector) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// One detector per project root.
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    inner: Arc<Mutex<HashMap<PathBuf, SharedDetector>>>,
}

impl DetectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, root: &Path) -> Option<SharedDetector> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(root)
            .cloned()
    }

    pub fn insert(&self, root: PathBuf, detector: SharedDetector) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(root, detector);
    }

    pub fn remove(&self, root: &Path) -> Option<SharedDetector> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(root)
    }
}
