//! Outline: ATX headers nested by level, with entity mentions as leaves.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use saga_types::text::{line_text, position_at, utf16_len};
use saga_types::{EntityKind, Position, PositionedMatch, Range};

use super::DocumentView;
use crate::types::{DocumentSymbol, SymbolKind};

struct Header {
    line: u32,
    level: usize,
    title: String,
    width: u32,
}

/// A header section before it is assembled into the tree.
struct Section {
    symbol: Option<DocumentSymbol>,
    parent: Option<usize>,
    depth: usize,
    start_line: u32,
    end_line: u32,
}

/// Headings as CommonMark sees them, so fenced code and indented headings
/// are handled like any renderer would.
fn headers(content: &str) -> Vec<Header> {
    let mut headers = Vec::new();
    let mut open: Option<(usize, usize, String)> = None;
    for (event, span) in Parser::new_ext(content, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                open = Some((level as usize, span.start, String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, _, title)) = open.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                let Some((level, start, title)) = open.take() else {
                    continue;
                };
                let title = title.trim();
                if title.is_empty() {
                    continue;
                }
                let line = position_at(content, start).line;
                headers.push(Header {
                    line,
                    level,
                    title: title.to_string(),
                    width: line_text(content, line)
                        .map_or(0, |text| utf16_len(text.trim_end_matches('\r'))),
                });
            }
            _ => {}
        }
    }
    headers
}

fn entity_symbol_kind(kind: EntityKind) -> SymbolKind {
    match kind {
        EntityKind::Character => SymbolKind::Class,
        EntityKind::Setting => SymbolKind::Module,
        EntityKind::Item => SymbolKind::Object,
        EntityKind::Event => SymbolKind::Event,
        EntityKind::Foreshadowing => SymbolKind::Constant,
    }
}

fn entity_symbol(m: &PositionedMatch) -> Option<DocumentSymbol> {
    let first = m.positions.first()?;
    let mentions = m.positions.len();
    let noun = if mentions == 1 { "mention" } else { "mentions" };
    Some(DocumentSymbol {
        name: m.name.clone(),
        detail: Some(format!("{} · {mentions} {noun}", m.kind)),
        kind: entity_symbol_kind(m.kind),
        range: first.range(),
        selection_range: first.range(),
        children: Vec::new(),
    })
}

pub(super) fn document_symbols(view: &DocumentView<'_>) -> Vec<DocumentSymbol> {
    let lines: Vec<&str> = view.content.split('\n').collect();
    let last_line = lines.len().saturating_sub(1) as u32;
    let line_width = |line: u32| {
        lines
            .get(line as usize)
            .map_or(0, |l| utf16_len(l.trim_end_matches('\r')))
    };

    // Level stack: open sections whose end is not yet known.
    let mut sections: Vec<Section> = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for header in headers(view.content) {
        while let Some(&(level, idx)) = stack.last() {
            if level < header.level {
                break;
            }
            sections[idx].end_line = header.line.saturating_sub(1).max(sections[idx].start_line);
            stack.pop();
        }
        let parent = stack.last().map(|&(_, idx)| idx);
        let header_range = Range::on_line(header.line, 0, header.width);
        sections.push(Section {
            symbol: Some(DocumentSymbol {
                name: header.title,
                detail: None,
                kind: SymbolKind::Namespace,
                range: header_range,
                selection_range: header_range,
                children: Vec::new(),
            }),
            parent,
            depth: stack.len(),
            start_line: header.line,
            end_line: last_line,
        });
        stack.push((header.level, sections.len() - 1));
    }

    let mut children: Vec<Vec<DocumentSymbol>> = sections.iter().map(|_| Vec::new()).collect();
    let mut roots = Vec::new();

    for m in view.resolver.detect_all(view.content).iter() {
        let Some(symbol) = entity_symbol(m) else {
            continue;
        };
        let line = symbol.range.start.line;
        let owner = sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.start_line <= line && line <= s.end_line)
            .max_by_key(|(_, s)| s.depth)
            .map(|(idx, _)| idx);
        match owner {
            Some(idx) => children[idx].push(symbol),
            None => roots.push(symbol),
        }
    }

    // Sections only ever nest under earlier ones, so assembling in reverse
    // finishes every child before its parent.
    for idx in (0..sections.len()).rev() {
        let Some(mut symbol) = sections[idx].symbol.take() else {
            continue;
        };
        let end_line = sections[idx].end_line;
        symbol.range = Range::new(
            Position::new(sections[idx].start_line, 0),
            Position::new(end_line, line_width(end_line)),
        );
        symbol.children = std::mem::take(&mut children[idx]);
        symbol.children.sort_by_key(|child| child.range.start);
        match sections[idx].parent {
            Some(parent) => children[parent].push(symbol),
            None => roots.push(symbol),
        }
    }
    roots.sort_by_key(|symbol| symbol.range.start);
    roots
}
