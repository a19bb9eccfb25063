//! Batch events and the overwrite prompt: the seam to the presentation layer.
//!
//! The batch worker never touches UI state. Every outcome is a
//! [`BatchEvent`] pushed into a bounded `tokio::sync::mpsc` channel that the
//! host (CLI, GUI, web socket bridge) drains at its own pace. The worker
//! does not wait for events to be handled, and a dropped receiver is
//! ignored: the batch runs to completion either way.
//!
//! The one place the worker does wait is [`OverwritePrompt`]: when an album
//! is already recorded, the batch pauses until the host answers yes or no.
//!
//! # Example
//!
//! ```rust
//! use album2pdf::{event_channel, BatchEvent};
//!
//! # tokio_test::block_on(async {
//! let (events, mut rx) = event_channel(16);
//! events.emit(BatchEvent::Started { total: 2 }).await;
//! drop(events);
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{event}");
//! }
//! # });
//! ```

use crate::batch::BatchSummary;
use crate::error::ItemError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::trace;

/// One entry in the ordered status log of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// The identifier list was empty; nothing was processed.
    NoInput,
    /// Batch size after deduplication.
    Started { total: usize },
    /// An album passed the duplicate check and is about to be fetched.
    ItemStarted { id: String, index: usize, total: usize },
    /// Title metadata arrived for an album.
    TitleResolved { id: String, title: String },
    /// Already recorded and the prompt declined a re-download.
    DuplicateSkipped { id: String, title: String },
    /// PDF written.
    ItemSucceeded {
        id: String,
        title: String,
        artifact: PathBuf,
    },
    /// Lookup or fetch failed; the batch moves on.
    ItemFailed { error: ItemError },
    /// The PDF exists but its record could not be persisted.
    RecordNotSaved { id: String, detail: String },
    /// Scratch directory reset succeeded on the given attempt.
    ScratchCleaned { attempts: u32 },
    /// Scratch directory reset gave up; the batch continues regardless.
    ScratchCleanupFailed {
        path: PathBuf,
        attempts: u32,
        detail: String,
    },
    /// Monotonic progress: `value` of `max` albums reached a terminal state.
    Progress { value: usize, max: usize },
    /// Batch complete.
    Finished(BatchSummary),
}

impl fmt::Display for BatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchEvent::NoInput => write!(f, "No album IDs given, nothing to do"),
            BatchEvent::Started { total } => {
                write!(f, "Found {total} album IDs, starting…")
            }
            BatchEvent::ItemStarted { id, index, total } => {
                write!(f, "=== Processing album {id} ({index}/{total}) ===")
            }
            BatchEvent::TitleResolved { title, .. } => write!(f, "Title: {title}"),
            BatchEvent::DuplicateSkipped { id, title } => {
                write!(f, "Skipped album {id}: already downloaded as \"{title}\"")
            }
            BatchEvent::ItemSucceeded {
                title, artifact, ..
            } => write!(f, "Saved \"{title}\" → {}", artifact.display()),
            BatchEvent::ItemFailed { error } => write!(f, "Failed: {error}"),
            BatchEvent::RecordNotSaved { id, detail } => {
                write!(f, "Record for album {id} not saved: {detail}")
            }
            BatchEvent::ScratchCleaned { attempts } => {
                write!(f, "Scratch directory cleaned (attempt {attempts})")
            }
            BatchEvent::ScratchCleanupFailed {
                path,
                attempts,
                detail,
            } => write!(
                f,
                "Scratch directory cleanup failed after {attempts} attempts: {} ({detail})",
                path.display()
            ),
            BatchEvent::Progress { value, max } => write!(f, "{value}/{max}"),
            BatchEvent::Finished(summary) => write!(
                f,
                "All done: {} saved, {} skipped, {} failed",
                summary.succeeded, summary.skipped, summary.failed
            ),
        }
    }
}

/// Sending half of the batch event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<BatchEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<BatchEvent>) -> Self {
        Self { tx }
    }

    /// A sender whose events go nowhere.
    pub fn detached() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }

    /// Queue an event. Waits only while the buffer is full; never fails.
    pub async fn emit(&self, event: BatchEvent) {
        if let Err(e) = self.tx.send(event).await {
            trace!("event receiver dropped, discarding {:?}", e.0);
        }
    }
}

/// Create a bounded event channel with room for `capacity` pending events.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<BatchEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Asks the user whether an already-downloaded album should be fetched again.
///
/// Called by the batch worker mid-run; the batch waits for the answer.
#[async_trait]
pub trait OverwritePrompt: Send + Sync {
    /// Return `true` to download `id` again despite the existing record.
    async fn confirm_overwrite(&self, id: &str, existing_title: &str) -> bool;
}

/// Re-download every recorded album without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOverwrite;

#[async_trait]
impl OverwritePrompt for AlwaysOverwrite {
    async fn confirm_overwrite(&self, _id: &str, _existing_title: &str) -> bool {
        true
    }
}

/// Skip every recorded album without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverOverwrite;

#[async_trait]
impl OverwritePrompt for NeverOverwrite {
    async fn confirm_overwrite(&self, _id: &str, _existing_title: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (events, mut rx) = event_channel(4);
        events.emit(BatchEvent::Started { total: 2 }).await;
        events.emit(BatchEvent::Progress { value: 1, max: 2 }).await;
        drop(events);

        assert_eq!(rx.recv().await, Some(BatchEvent::Started { total: 2 }));
        assert_eq!(
            rx.recv().await,
            Some(BatchEvent::Progress { value: 1, max: 2 })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn detached_sender_never_blocks() {
        let events = EventSender::detached();
        for value in 0..10 {
            events.emit(BatchEvent::Progress { value, max: 10 }).await;
        }
    }

    #[tokio::test]
    async fn stock_prompts_answer_fixed() {
        assert!(AlwaysOverwrite.confirm_overwrite("A", "Foo").await);
        assert!(!NeverOverwrite.confirm_overwrite("A", "Foo").await);
    }

    #[test]
    fn skip_line_mentions_title() {
        let line = BatchEvent::DuplicateSkipped {
            id: "A".into(),
            title: "Foo".into(),
        }
        .to_string();
        assert!(line.contains('A'));
        assert!(line.contains("Foo"));
    }

    #[test]
    fn failure_line_names_id_and_cause() {
        let line = BatchEvent::ItemFailed {
            error: ItemError::FetchFailed {
                id: "C".into(),
                detail: "network unreachable".into(),
            },
        }
        .to_string();
        assert!(line.contains("C:"));
        assert!(line.contains("network unreachable"));
    }

    #[test]
    fn events_serialise_with_tag() {
        let json = serde_json::to_string(&BatchEvent::Progress { value: 1, max: 3 }).unwrap();
        assert_eq!(json, r#"{"event":"progress","value":1,"max":3}"#);
    }
}
