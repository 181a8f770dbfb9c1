//! Request-driven features built on entity detection.
//!
//! Every provider reads one [`DocumentView`]. Errors are [`ProviderError`]s,
//! which the dispatcher turns into empty results.

mod code_action;
mod code_lens;
mod completion;
mod definition;
mod document_symbols;
mod file_reference;
mod hover;
mod resolver;
mod semantic_tokens;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use saga_types::{EntityInfo, EntityKey, Location, Position, Range};

use crate::protocol::{PathToUriError, path_to_file_uri};
use crate::types::{CodeAction, CodeLens, CompletionItem, DocumentSymbol, Hover, SemanticTokens};

pub use resolver::{EntityResolver, ResolvedEntity};
pub use semantic_tokens::{TOKEN_MODIFIERS, token_types};

pub const REVEAL_ENTITY_COMMAND: &str = "saga.revealEntity";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Uri(#[from] PathToUriError),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One document as seen by the providers.
pub struct DocumentView<'a> {
    pub uri: &'a str,
    pub content: &'a str,
    pub project_root: Option<&'a Path>,
    pub entity_info: Option<&'a HashMap<EntityKey, EntityInfo>>,
    pub resolver: EntityResolver,
}

impl<'a> DocumentView<'a> {
    /// A document outside any project.
    #[must_use]
    pub fn detached(uri: &'a str, content: &'a str) -> Self {
        Self {
            uri,
            content,
            project_root: None,
            entity_info: None,
            resolver: EntityResolver::default(),
        }
    }

    #[must_use]
    pub fn info(&self, key: &EntityKey) -> Option<&'a EntityInfo> {
        self.entity_info.and_then(|info| info.get(key))
    }

    /// Location of the first line of an entity's definition file.
    pub(crate) fn definition_location(
        &self,
        file_path: &str,
    ) -> Result<Option<Location>, ProviderError> {
        let Some(root) = self.project_root else {
            return Ok(None);
        };
        let uri = path_to_file_uri(&root.join(file_path))?;
        Ok(Some(Location {
            uri: uri.to_string(),
            range: Range::document_start(),
        }))
    }
}

pub trait FeatureProvider: Send + Sync {
    fn definition(
        &self,
        view: &DocumentView<'_>,
        position: Position,
    ) -> Result<Option<Location>, ProviderError>;

    fn hover(
        &self,
        view: &DocumentView<'_>,
        position: Position,
    ) -> Result<Option<Hover>, ProviderError>;

    fn code_actions(
        &self,
        view: &DocumentView<'_>,
        range: Range,
    ) -> Result<Vec<CodeAction>, ProviderError>;

    /// Tokens for the whole document, or only those starting inside `range`.
    fn semantic_tokens(
        &self,
        view: &DocumentView<'_>,
        range: Option<Range>,
    ) -> Result<SemanticTokens, ProviderError>;

    fn document_symbols(
        &self,
        view: &DocumentView<'_>,
    ) -> Result<Vec<DocumentSymbol>, ProviderError>;

    fn completion(
        &self,
        view: &DocumentView<'_>,
        position: Position,
    ) -> Result<Vec<CompletionItem>, ProviderError>;

    fn code_lens(&self, view: &DocumentView<'_>) -> Result<Vec<CodeLens>, ProviderError>;
}

/// The built-in providers.
#[derive(Debug, Clone)]
pub struct DefaultFeatureProvider {
    hover_preview_chars: usize,
}

impl DefaultFeatureProvider {
    #[must_use]
    pub fn new(hover_preview_chars: usize) -> Self {
        Self { hover_preview_chars }
    }
}

impl FeatureProvider for DefaultFeatureProvider {
    fn definition(
        &self,
        view: &DocumentView<'_>,
        position: Position,
    ) -> Result<Option<Location>, ProviderError> {
        definition::definition(view, position)
    }

    fn hover(
        &self,
        view: &DocumentView<'_>,
        position: Position,
    ) -> Result<Option<Hover>, ProviderError> {
        hover::hover(view, position, self.hover_preview_chars)
    }

    fn code_actions(
        &self,
        view: &DocumentView<'_>,
        range: Range,
    ) -> Result<Vec<CodeAction>, ProviderError> {
        Ok(code_action::code_actions(view, range))
    }

    fn semantic_tokens(
        &self,
        view: &DocumentView<'_>,
        range: Option<Range>,
    ) -> Result<SemanticTokens, ProviderError> {
        Ok(semantic_tokens::semantic_tokens(view, range))
    }

    fn document_symbols(
        &self,
        view: &DocumentView<'_>,
    ) -> Result<Vec<DocumentSymbol>, ProviderError> {
        Ok(document_symbols::document_symbols(view))
    }

    fn completion(
        &self,
        view: &DocumentView<'_>,
        position: Position,
    ) -> Result<Vec<CompletionItem>, ProviderError> {
        Ok(completion::completion(view, position))
    }

    fn code_lens(&self, view: &DocumentView<'_>) -> Result<Vec<CodeLens>, ProviderError> {
        code_lens::code_lens(view)
    }
}
