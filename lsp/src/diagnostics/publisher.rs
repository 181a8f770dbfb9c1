use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use saga_types::Diagnostic;
use tokio::task::JoinHandle;

use crate::outbound::Outbound;
use crate::types::PublishDiagnosticsParams;

const PUBLISH_METHOD: &str = "textDocument/publishDiagnostics";

/// A debounced publication waiting for its timer.
struct PendingPublish {
    generation: u64,
    diagnostics: Vec<Diagnostic>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct PendingMap {
    next_generation: u64,
    entries: HashMap<String, PendingPublish>,
}

/// Sends `textDocument/publishDiagnostics`, immediately or coalesced per
/// document.
///
/// Each document has at most one pending entry. Replacing it swaps the
/// payload and timer under one lock, and a timer only fires if its
/// generation is still the current one.
pub struct DiagnosticsPublisher {
    outbound: Outbound,
    delay: Duration,
    pending: Arc<Mutex<PendingMap>>,
}

impl DiagnosticsPublisher {
    #[must_use]
    pub fn new(outbound: Outbound, delay: Duration) -> Self {
        Self {
            outbound,
            delay,
            pending: Arc::new(Mutex::new(PendingMap::default())),
        }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Publish now, superseding any pending publication for `uri`.
    pub async fn publish(&self, uri: &str, diagnostics: Vec<Diagnostic>) {
        self.cancel(uri);
        send(&self.outbound, uri, &diagnostics).await;
    }

    /// Replace the pending publication for `uri` and restart its timer.
    pub fn publish_debounced(&self, uri: &str, diagnostics: Vec<Diagnostic>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.next_generation += 1;
        let generation = pending.next_generation;

        if let Some(previous) = pending.entries.remove(uri)
            && let Some(timer) = previous.timer
        {
            timer.abort();
        }

        let timer = tokio::spawn(fire_after(
            self.delay,
            Arc::clone(&self.pending),
            self.outbound.clone(),
            uri.to_string(),
            generation,
        ));
        pending.entries.insert(
            uri.to_string(),
            PendingPublish {
                generation,
                diagnostics,
                timer: Some(timer),
            },
        );
    }

    /// Drop the pending publication for `uri`, if any.
    pub fn cancel(&self, uri: &str) {
        let removed = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(uri);
        if let Some(timer) = removed.and_then(|entry| entry.timer) {
            timer.abort();
        }
    }

    /// Cancel every pending publication.
    pub fn dispose(&self) {
        let drained: Vec<PendingPublish> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for timer in drained.into_iter().filter_map(|entry| entry.timer) {
            timer.abort();
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

async fn fire_after(
    delay: Duration,
    pending: Arc<Mutex<PendingMap>>,
    outbound: Outbound,
    uri: String,
    generation: u64,
) {
    tokio::time::sleep(delay).await;
    // The slot is taken before the generation check so the payload is
    // queued under the same lock that `cancel` and `publish` take.
    let Ok(permit) = outbound.reserve().await else {
        tracing::debug!(uri, "Dropped diagnostics: writer closed");
        return;
    };
    let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
    if pending
        .entries
        .get(&uri)
        .is_none_or(|entry| entry.generation != generation)
    {
        return;
    }
    let Some(entry) = pending.entries.remove(&uri) else {
        return;
    };
    tracing::debug!(uri, count = entry.diagnostics.len(), "Publishing diagnostics");
    let params = PublishDiagnosticsParams {
        uri: &uri,
        diagnostics: &entry.diagnostics,
    };
    permit.notify(PUBLISH_METHOD, &params);
}

async fn send(outbound: &Outbound, uri: &str, diagnostics: &[Diagnostic]) {
    tracing::debug!(uri, count = diagnostics.len(), "Publishing diagnostics");
    let params = PublishDiagnosticsParams { uri, diagnostics };
    if let Err(err) = outbound.notify(PUBLISH_METHOD, &params).await {
        tracing::debug!(uri, "Dropped diagnostics: {err}");
    }
}
