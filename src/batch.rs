//! Batch controller: run a list of album IDs against the record store.
//!
//! ## Flow per batch
//!
//! ```text
//! raw text ──▶ normalize_ids ──▶ for each id (sequential):
//!                                  ├─ recorded? ──▶ prompt ──no──▶ SkippedDuplicate
//!                                  ├─ lookup_detail ──err──▶ Failed
//!                                  ├─ fetch_and_assemble ──err──▶ Failed
//!                                  └─ add_record ─▶ reset scratch ─▶ Succeeded
//!                                final scratch reset ─▶ Finished
//! ```
//!
//! Albums are processed strictly one at a time. A failure is confined to
//! its own identifier: it is reported and the loop moves on. Only an empty
//! identifier list ends a batch early. There is no cancellation; a started
//! batch runs to the end.

use crate::config::DownloaderConfig;
use crate::error::{Album2PdfError, ItemError};
use crate::progress::{event_channel, BatchEvent, EventSender, OverwritePrompt};
use crate::record::RecordStore;
use crate::source::AlbumSource;
use crate::workspace::reset_scratch_dir;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Split on whitespace, drop empty tokens, and deduplicate keeping the
/// first occurrence of each identifier.
pub fn normalize_ids(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split_whitespace()
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Terminal state of one identifier within a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Already recorded; re-download declined.
    SkippedDuplicate { title: String },
    /// Lookup or fetch failed.
    Failed { error: ItemError },
    /// PDF written (its record may still have failed to persist).
    Succeeded { title: String, artifact: PathBuf },
}

/// Outcome for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub id: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// Aggregate result of a batch, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Unique identifiers in the batch.
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchSummary {
    fn new(total: usize) -> Self {
        Self {
            total,
            outcomes: Vec::with_capacity(total),
            ..Default::default()
        }
    }

    fn push(&mut self, outcome: ItemOutcome) {
        match outcome.status {
            ItemStatus::SkippedDuplicate { .. } => self.skipped += 1,
            ItemStatus::Failed { .. } => self.failed += 1,
            ItemStatus::Succeeded { .. } => self.succeeded += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Identifiers that failed, in processing order.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ItemStatus::Failed { .. }))
            .map(|o| o.id.as_str())
            .collect()
    }
}

/// Sequences album downloads against a [`RecordStore`] and an [`AlbumSource`].
pub struct BatchController {
    config: DownloaderConfig,
    records: Arc<RecordStore>,
    source: Arc<dyn AlbumSource>,
    prompt: Arc<dyn OverwritePrompt>,
}

impl BatchController {
    pub fn new(
        config: DownloaderConfig,
        records: Arc<RecordStore>,
        source: Arc<dyn AlbumSource>,
        prompt: Arc<dyn OverwritePrompt>,
    ) -> Self {
        Self {
            config,
            records,
            source,
            prompt,
        }
    }

    /// The record store this controller writes to.
    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    /// Run a batch on a background task.
    ///
    /// Events stream through the returned handle; drain them (or drop the
    /// stream) so the worker is never held up by a full buffer.
    pub fn spawn(self: Arc<Self>, raw_ids: impl Into<String>) -> BatchHandle {
        let (events, rx) = event_channel(self.config.event_buffer);
        let raw_ids = raw_ids.into();
        let join = tokio::spawn(async move { self.run_batch(&raw_ids, &events).await });
        BatchHandle {
            events: ReceiverStream::new(rx),
            join,
        }
    }

    /// Process every unique identifier in `raw_ids`, reporting through `events`.
    ///
    /// # Errors
    /// Only [`Album2PdfError::EmptyInput`]; every other failure is reported
    /// as an event and recorded in the summary.
    pub async fn run_batch(
        &self,
        raw_ids: &str,
        events: &EventSender,
    ) -> Result<BatchSummary, Album2PdfError> {
        let ids = normalize_ids(raw_ids);
        if ids.is_empty() {
            warn!("Batch started with no album IDs");
            events.emit(BatchEvent::NoInput).await;
            return Err(Album2PdfError::EmptyInput);
        }

        let total = ids.len();
        info!("Starting batch of {} albums", total);
        events.emit(BatchEvent::Started { total }).await;
        events.emit(BatchEvent::Progress { value: 0, max: total }).await;

        let mut summary = BatchSummary::new(total);
        for (idx, id) in ids.into_iter().enumerate() {
            let index = idx + 1;
            let status = self.process_one(&id, index, total, events).await;
            summary.push(ItemOutcome { id, status });
            events
                .emit(BatchEvent::Progress {
                    value: index,
                    max: total,
                })
                .await;
        }

        self.clean_scratch(events).await;

        info!(
            "Batch finished: {} saved, {} skipped, {} failed",
            summary.succeeded, summary.skipped, summary.failed
        );
        events.emit(BatchEvent::Finished(summary.clone())).await;
        Ok(summary)
    }

    async fn process_one(
        &self,
        id: &str,
        index: usize,
        total: usize,
        events: &EventSender,
    ) -> ItemStatus {
        // ── Duplicate check ──────────────────────────────────────────────
        if self.records.is_downloaded(id) {
            let title = self.records.get_title(id);
            if !self.prompt.confirm_overwrite(id, &title).await {
                info!("Album {}: already downloaded, skipping", id);
                events
                    .emit(BatchEvent::DuplicateSkipped {
                        id: id.to_string(),
                        title: title.clone(),
                    })
                    .await;
                return ItemStatus::SkippedDuplicate { title };
            }
            debug!("Album {}: re-download confirmed", id);
        }

        events
            .emit(BatchEvent::ItemStarted {
                id: id.to_string(),
                index,
                total,
            })
            .await;

        // ── Fetch ────────────────────────────────────────────────────────
        let mut detail = match self.source.lookup_detail(id).await {
            Ok(detail) => detail,
            Err(e) => {
                let error = ItemError::LookupFailed {
                    id: id.to_string(),
                    detail: e.to_string(),
                };
                return self.fail(error, events).await;
            }
        };
        if detail.id.is_empty() {
            detail.id = id.to_string();
        }
        events
            .emit(BatchEvent::TitleResolved {
                id: id.to_string(),
                title: detail.title.clone(),
            })
            .await;

        let artifact = match self.source.fetch_and_assemble(&detail).await {
            Ok(path) => path,
            Err(e) => {
                let error = ItemError::FetchFailed {
                    id: id.to_string(),
                    detail: e.to_string(),
                };
                return self.fail(error, events).await;
            }
        };
        info!("Album {}: saved {}", id, artifact.display());
        events
            .emit(BatchEvent::ItemSucceeded {
                id: id.to_string(),
                title: detail.title.clone(),
                artifact: artifact.clone(),
            })
            .await;

        // ── Record + cleanup ─────────────────────────────────────────────
        self.save_record(id, &detail.title, events).await;
        self.clean_scratch(events).await;

        ItemStatus::Succeeded {
            title: detail.title,
            artifact,
        }
    }

    async fn fail(&self, error: ItemError, events: &EventSender) -> ItemStatus {
        warn!("{}", error);
        events
            .emit(BatchEvent::ItemFailed {
                error: error.clone(),
            })
            .await;
        ItemStatus::Failed { error }
    }

    async fn save_record(&self, id: &str, title: &str, events: &EventSender) {
        let records = Arc::clone(&self.records);
        let (owned_id, owned_title) = (id.to_string(), title.to_string());
        let result = tokio::task::spawn_blocking(move || records.add_record(&owned_id, &owned_title))
            .await
            .unwrap_or_else(|e| Err(Album2PdfError::Internal(format!("record task panicked: {}", e))));

        let detail = match result {
            Ok(()) => return,
            Err(Album2PdfError::RecordWrite { detail, .. }) => detail,
            Err(other) => other.to_string(),
        };
        warn!("Album {}: record not persisted: {}", id, detail);
        events
            .emit(BatchEvent::RecordNotSaved {
                id: id.to_string(),
                detail,
            })
            .await;
    }

    async fn clean_scratch(&self, events: &EventSender) {
        let scratch = self.config.scratch_dir();
        let result = reset_scratch_dir(
            &scratch,
            self.config.cleanup_attempts,
            self.config.cleanup_backoff(),
        )
        .await;

        let event = match result {
            Ok(attempts) => BatchEvent::ScratchCleaned { attempts },
            Err(Album2PdfError::ScratchCleanup {
                path,
                attempts,
                detail,
            }) => BatchEvent::ScratchCleanupFailed {
                path,
                attempts,
                detail,
            },
            Err(other) => BatchEvent::ScratchCleanupFailed {
                path: scratch,
                attempts: self.config.cleanup_attempts,
                detail: other.to_string(),
            },
        };
        events.emit(event).await;
    }
}

/// A batch running on a background task.
pub struct BatchHandle {
    events: ReceiverStream<BatchEvent>,
    join: JoinHandle<Result<BatchSummary, Album2PdfError>>,
}

impl BatchHandle {
    /// Ordered event stream; ends when the batch finishes.
    pub fn events(&mut self) -> &mut ReceiverStream<BatchEvent> {
        &mut self.events
    }

    /// Wait for the batch to finish. Undrained events are discarded.
    pub async fn wait(self) -> Result<BatchSummary, Album2PdfError> {
        let BatchHandle { events, join } = self;
        drop(events);
        join.await
            .map_err(|e| Album2PdfError::Internal(format!("batch task failed: {}", e)))?
    }
}
