//! Diagnostics pipeline.
//!
//! Sources implement [`DiagnosticSource`]. The [`DiagnosticsAggregator`]
//! fans a document out to every available source and merges the results;
//! the [`DiagnosticsPublisher`] sends them to the client, optionally
//! debounced per document.

mod aggregator;
mod entity_source;
mod publisher;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use saga_types::Diagnostic;

pub use aggregator::{DiagnosticsAggregator, DiagnosticsRound, SourceFailure};
pub use entity_source::{EntityDiagnosticSource, entity_diagnostics};
pub use publisher::DiagnosticsPublisher;

/// Boxed future returned by source operations.
pub type SourceFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("diagnostic generation failed: {0}")]
    Failed(String),
    #[error("diagnostic generation cancelled")]
    Cancelled,
}

/// A producer of diagnostics for a document.
pub trait DiagnosticSource: Send + Sync {
    /// Stable name written into each diagnostic's `source` field.
    fn name(&self) -> &str;

    fn is_available(&self) -> SourceFut<'_, bool>;

    fn generate<'a>(
        &'a self,
        uri: &'a str,
        content: &'a str,
        project_root: Option<&'a Path>,
    ) -> SourceFut<'a, Vec<Diagnostic>>;

    /// Abandon in-flight work. Sources without background work ignore it.
    fn cancel(&self) {}

    /// Release held resources. Called once at shutdown.
    fn dispose(&self) {}
}
