//! Semantic highlighting of entity mentions.
//!
//! Token types are the entity kinds in [`EntityKind::ALL`] order. Exactly
//! one confidence modifier is set per token; kinds that carry a lifecycle
//! status add one status modifier on top.

use saga_types::{EntityKind, LifecycleStatus, MatchTier, Position, PositionedMatch, Range};

use super::DocumentView;
use crate::types::SemanticTokens;

pub const TOKEN_MODIFIERS: [&str; 7] = [
    "highConfidence",
    "mediumConfidence",
    "lowConfidence",
    "planted",
    "partiallyResolved",
    "resolved",
    "abandoned",
];

const STATUS_MODIFIER_OFFSET: u32 = 3;

#[must_use]
pub fn token_types() -> Vec<&'static str> {
    EntityKind::ALL.iter().map(|kind| kind.as_str()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawToken {
    line: u32,
    start: u32,
    length: u32,
    token_type: u32,
    modifiers: u32,
}

fn tier_modifier(tier: MatchTier) -> u32 {
    match tier {
        MatchTier::Name => 1,
        MatchTier::DisplayName => 1 << 1,
        MatchTier::Alias => 1 << 2,
    }
}

fn status_modifier(status: LifecycleStatus) -> u32 {
    let index = LifecycleStatus::ALL
        .iter()
        .position(|s| *s == status)
        .unwrap_or(0) as u32;
    1 << (STATUS_MODIFIER_OFFSET + index)
}

fn collect_tokens(matches: &[PositionedMatch]) -> Vec<RawToken> {
    let mut tokens: Vec<RawToken> = matches
        .iter()
        .flat_map(|m| {
            let modifiers = tier_modifier(m.tier) | m.status.map_or(0, status_modifier);
            m.positions.iter().map(move |p| RawToken {
                line: p.line,
                start: p.character,
                length: p.length,
                token_type: m.kind.index(),
                modifiers,
            })
        })
        .collect();
    tokens.sort_by_key(|t| (t.line, t.start, std::cmp::Reverse(t.length)));

    // Clients reject overlapping tokens; keep the earliest on each line.
    let mut kept: Vec<RawToken> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let Some(last) = kept.last()
            && last.line == token.line
            && token.start < last.start + last.length
        {
            continue;
        }
        kept.push(token);
    }
    kept
}

/// Delta-encode sorted tokens. The first token's line delta is relative to
/// `base_line`.
fn encode(tokens: &[RawToken], base_line: u32) -> Vec<u32> {
    let mut data = Vec::with_capacity(tokens.len() * 5);
    let mut prev_line = base_line;
    let mut prev_start = 0;
    for token in tokens {
        let delta_line = token.line - prev_line;
        let delta_start = if delta_line == 0 {
            token.start - prev_start
        } else {
            token.start
        };
        data.extend_from_slice(&[
            delta_line,
            delta_start,
            token.length,
            token.token_type,
            token.modifiers,
        ]);
        prev_line = token.line;
        prev_start = token.start;
    }
    data
}

pub(super) fn semantic_tokens(view: &DocumentView<'_>, range: Option<Range>) -> SemanticTokens {
    let matches = view.resolver.detect_all(view.content);
    let tokens = collect_tokens(&matches);
    let data = match range.map(Range::normalized) {
        None => encode(&tokens, 0),
        Some(window) => {
            let inside: Vec<RawToken> = tokens
                .into_iter()
                .filter(|t| {
                    let start = Position::new(t.line, t.start);
                    window.start <= start && start < window.end
                })
                .collect();
            encode(&inside, window.start.line)
        }
    };
    SemanticTokens { data }
}
