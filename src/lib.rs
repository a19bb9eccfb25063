//! # album2pdf
//!
//! Download paginated image albums from a content service, assemble each
//! album into a single PDF, and remember which albums were already done.
//!
//! ## Batch Overview
//!
//! ```text
//! "123 456\n123"
//!  │
//!  ├─ 1. Normalise   split on whitespace, drop blanks, dedupe (first wins)
//!  ├─ 2. Duplicate   recorded already? ask the OverwritePrompt
//!  ├─ 3. Lookup      album title from the content service
//!  ├─ 4. Fetch       page images → scratch dir → one PDF in the output dir
//!  ├─ 5. Record      id → {title, download_time} in downloaded_records.json
//!  └─ 6. Cleanup     wipe the scratch dir (retried, never fatal)
//! ```
//!
//! Albums run one after another on a background task; each step's outcome
//! is published as a [`BatchEvent`] on a bounded channel. A failing album
//! is reported and skipped; it never stops the batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use album2pdf::{
//!     AlwaysOverwrite, BatchController, DownloaderConfig, HttpAlbumSource, RecordStore,
//! };
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DownloaderConfig::builder()
//!         .output_dir("albums")
//!         .api_base("https://gallery.example.com/api")
//!         .build()?;
//!     config.ensure_dirs().await?;
//!
//!     let records = Arc::new(RecordStore::open(config.record_file()));
//!     let source = Arc::new(HttpAlbumSource::new(&config)?);
//!     let controller = Arc::new(BatchController::new(
//!         config,
//!         records,
//!         source,
//!         Arc::new(AlwaysOverwrite),
//!     ));
//!
//!     let mut batch = controller.spawn("1198446 1198447");
//!     while let Some(event) = batch.events().next().await {
//!         println!("{event}");
//!     }
//!     let summary = batch.wait().await?;
//!     eprintln!("{} saved, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `album2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod source;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{normalize_ids, BatchController, BatchHandle, BatchSummary, ItemOutcome, ItemStatus};
pub use config::{DownloaderConfig, DownloaderConfigBuilder};
pub use error::{Album2PdfError, ItemError};
pub use progress::{
    event_channel, AlwaysOverwrite, BatchEvent, EventSender, NeverOverwrite, OverwritePrompt,
};
pub use record::{DownloadRecord, RecordStore, UNKNOWN_TITLE};
pub use source::{AlbumDetail, AlbumSource, HttpAlbumSource};
pub use workspace::reset_scratch_dir;
