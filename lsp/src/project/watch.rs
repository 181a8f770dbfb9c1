//! Buffering of watched-file events and the reload decision.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::FileChangeType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: FileChangeType,
}

/// Sent to the server loop when the quiet period ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchFlush {
    pub generation: u64,
}

/// Collects file-change batches behind one restartable timer.
pub struct WatchBatcher {
    delay: Duration,
    pending: Vec<FileChange>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    flush_tx: mpsc::Sender<WatchFlush>,
}

impl WatchBatcher {
    #[must_use]
    pub fn new(delay: Duration, flush_tx: mpsc::Sender<WatchFlush>) -> Self {
        Self {
            delay,
            pending: Vec::new(),
            generation: 0,
            timer: None,
            flush_tx,
        }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Buffer `changes` and restart the timer.
    pub fn push(&mut self, changes: impl IntoIterator<Item = FileChange>) {
        self.pending.extend(changes);
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let delay = self.delay;
        let generation = self.generation;
        let flush_tx = self.flush_tx.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = flush_tx.send(WatchFlush { generation }).await;
        }));
    }

    /// Take the buffered batch if `flush` is from the current timer.
    pub fn take(&mut self, flush: WatchFlush) -> Option<Vec<FileChange>> {
        if flush.generation != self.generation {
            tracing::trace!(generation = flush.generation, "Ignoring stale watch flush");
            return None;
        }
        self.timer = None;
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.pending.clear();
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// How to bring one project's entities up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadPlan {
    /// Re-read just these entity files.
    Incremental(Vec<PathBuf>),
    Full,
}

impl ReloadPlan {
    /// Incremental when only entity files changed and there are at most
    /// `limit` of them.
    pub fn for_changes<'a>(
        changes: impl IntoIterator<Item = &'a FileChange>,
        limit: usize,
        is_entity_file: impl Fn(&Path) -> bool,
    ) -> Self {
        let mut entity_files: Vec<PathBuf> = Vec::new();
        let mut other_files = 0usize;
        for change in changes {
            if is_entity_file(&change.path) {
                if !entity_files.contains(&change.path) {
                    entity_files.push(change.path.clone());
                }
            } else {
                other_files += 1;
            }
        }
        if other_files == 0 && !entity_files.is_empty() && entity_files.len() <= limit {
            ReloadPlan::Incremental(entity_files)
        } else {
            ReloadPlan::Full
        }
    }
}
