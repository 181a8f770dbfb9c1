//! Registered entities and the matches the detector produces for them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::position::{Position, Range};

/// Category of a registered entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Character,
    Setting,
    Item,
    Event,
    Foreshadowing,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Character,
        EntityKind::Setting,
        EntityKind::Item,
        EntityKind::Event,
        EntityKind::Foreshadowing,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Setting => "setting",
            Self::Item => "item",
            Self::Event => "event",
            Self::Foreshadowing => "foreshadowing",
        }
    }

    /// Directory holding this kind's definition files.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Character => "characters",
            Self::Setting => "settings",
            Self::Item => "items",
            Self::Event => "events",
            Self::Foreshadowing => "foreshadowings",
        }
    }

    #[must_use]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.dir_name() == name)
    }

    /// Position of this kind in the semantic token legend.
    #[must_use]
    pub fn index(self) -> u32 {
        Self::ALL.iter().position(|kind| *kind == self).unwrap_or(0) as u32
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of kinds that track progress through the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Planted,
    PartiallyResolved,
    Resolved,
    Abandoned,
}

impl LifecycleStatus {
    pub const ALL: [LifecycleStatus; 4] = [
        LifecycleStatus::Planted,
        LifecycleStatus::PartiallyResolved,
        LifecycleStatus::Resolved,
        LifecycleStatus::Abandoned,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planted => "planted",
            Self::PartiallyResolved => "partiallyResolved",
            Self::Resolved => "resolved",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Identity of an entity: ids are only unique within a kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// An entity the detector searches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectableEntity {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_names: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Definition file, relative to the project root.
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LifecycleStatus>,
}

impl DetectableEntity {
    pub fn new(
        kind: EntityKind,
        id: impl Into<String>,
        name: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            name: name.into(),
            display_names: Vec::new(),
            aliases: Vec::new(),
            file_path: file_path.into(),
            status: None,
        }
    }

    pub fn with_display_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.display_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: LifecycleStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id.clone())
    }

    /// Search patterns in tier order. Empty and repeated patterns are
    /// skipped; a repeat keeps the tier it was first seen with.
    #[must_use]
    pub fn patterns(&self) -> Vec<(&str, MatchTier)> {
        let mut patterns: Vec<(&str, MatchTier)> = Vec::new();
        let candidates = std::iter::once((self.name.as_str(), MatchTier::Name))
            .chain(
                self.display_names
                    .iter()
                    .map(|name| (name.as_str(), MatchTier::DisplayName)),
            )
            .chain(
                self.aliases
                    .iter()
                    .map(|alias| (alias.as_str(), MatchTier::Alias)),
            );
        for (pattern, tier) in candidates {
            if pattern.is_empty() || patterns.iter().any(|(seen, _)| *seen == pattern) {
                continue;
            }
            patterns.push((pattern, tier));
        }
        patterns
    }
}

/// Structured information shown alongside an entity in hovers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl EntityInfo {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.details.is_empty()
    }
}

/// Which kind of pattern produced a match. Ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    Alias,
    DisplayName,
    Name,
}

impl MatchTier {
    #[must_use]
    pub const fn confidence(self) -> f64 {
        match self {
            Self::Name => 1.0,
            Self::DisplayName => 0.9,
            Self::Alias => 0.8,
        }
    }
}

/// One occurrence of an entity pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchPosition {
    pub line: u32,
    pub character: u32,
    pub length: u32,
}

impl MatchPosition {
    #[must_use]
    pub const fn new(line: u32, character: u32, length: u32) -> Self {
        Self {
            line,
            character,
            length,
        }
    }

    #[must_use]
    pub const fn start(&self) -> Position {
        Position::new(self.line, self.character)
    }

    #[must_use]
    pub const fn range(&self) -> Range {
        Range::on_line(self.line, self.character, self.length)
    }

    /// Whether `position` falls inside `[character, character + length)`.
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        position.line == self.line
            && position.character >= self.character
            && position.character < self.character + self.length
    }
}

/// All occurrences of one entity in one content snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedMatch {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub file_path: String,
    /// The highest-tier pattern that matched.
    pub matched_pattern: String,
    /// Sorted by `(line, character)`, no two sharing a start.
    pub positions: Vec<MatchPosition>,
    pub tier: MatchTier,
    pub status: Option<LifecycleStatus>,
}

impl PositionedMatch {
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.tier.confidence()
    }

    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id.clone())
    }

    /// First occurrence whose span contains `position`.
    #[must_use]
    pub fn position_containing(&self, position: Position) -> Option<&MatchPosition> {
        self.positions.iter().find(|pos| pos.contains(position))
    }
}
