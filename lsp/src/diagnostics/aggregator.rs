use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use saga_types::Diagnostic;

use super::{DiagnosticSource, SourceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
}

/// Merged output of one generation round.
#[derive(Debug, Default)]
pub struct DiagnosticsRound {
    pub diagnostics: Vec<Diagnostic>,
    pub failures: Vec<SourceFailure>,
}

/// Runs every registered source concurrently and merges the results in
/// registration order.
#[derive(Default)]
pub struct DiagnosticsAggregator {
    sources: Vec<Arc<dyn DiagnosticSource>>,
}

impl DiagnosticsAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn DiagnosticSource>) {
        tracing::debug!(source = source.name(), "Registered diagnostic source");
        self.sources.push(source);
    }

    #[must_use]
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn generate(
        &self,
        uri: &str,
        content: &str,
        project_root: Option<&Path>,
    ) -> DiagnosticsRound {
        // Sources may panic while building their future as well as while
        // polling it, so both happen inside the caught block.
        let availability = join_all(self.sources.iter().map(|source| {
            AssertUnwindSafe(async move { source.is_available().await }).catch_unwind()
        }))
        .await;

        let available: Vec<&Arc<dyn DiagnosticSource>> = self
            .sources
            .iter()
            .zip(availability)
            .filter_map(|(source, result)| match result {
                Ok(Ok(true)) => Some(source),
                Ok(Ok(false)) => {
                    tracing::trace!(source = source.name(), "Diagnostic source unavailable");
                    None
                }
                Ok(Err(err)) => {
                    tracing::debug!(
                        source = source.name(),
                        "Availability check failed, skipping: {err}"
                    );
                    None
                }
                Err(_) => {
                    tracing::warn!(source = source.name(), "Availability check panicked");
                    None
                }
            })
            .collect();

        let results = join_all(available.iter().map(|source| {
            AssertUnwindSafe(async move { source.generate(uri, content, project_root).await })
                .catch_unwind()
        }))
        .await;

        let mut round = DiagnosticsRound::default();
        for (source, result) in available.into_iter().zip(results) {
            let outcome = result.unwrap_or_else(|_| {
                Err(SourceError::Failed("source panicked".to_string()))
            });
            match outcome {
                Ok(diagnostics) => {
                    round
                        .diagnostics
                        .extend(diagnostics.into_iter().map(|mut diagnostic| {
                            diagnostic.source = source.name().to_string();
                            diagnostic
                        }));
                }
                Err(error) => {
                    tracing::warn!(source = source.name(), uri, "Diagnostic source failed: {error}");
                    round.failures.push(SourceFailure {
                        source: source.name().to_string(),
                        error,
                    });
                }
            }
        }
        round
    }

    pub fn cancel_all(&self) {
        for source in &self.sources {
            if std::panic::catch_unwind(AssertUnwindSafe(|| source.cancel())).is_err() {
                tracing::warn!(source = source.name(), "Diagnostic source panicked on cancel");
            }
        }
    }

    pub fn dispose(&self) {
        for source in &self.sources {
            if std::panic::catch_unwind(AssertUnwindSafe(|| source.dispose())).is_err() {
                tracing::warn!(source = source.name(), "Diagnostic source panicked on dispose");
            }
        }
    }
}
