//! Error types for the album2pdf library.
//!
//! Two error types reflect two failure scopes:
//!
//! * [`Album2PdfError`] — returned by individual operations: loading or
//!   saving the record file, resetting the scratch directory, talking to the
//!   content service, decoding images, writing the PDF. A few of these are
//!   fatal for a whole batch (empty input, bad configuration); the rest are
//!   caught by the batch controller at the smallest enclosing scope.
//!
//! * [`ItemError`] — **Non-fatal**: one identifier could not be processed.
//!   Stored in [`crate::batch::ItemOutcome`] so the batch keeps going and
//!   callers can inspect every failure afterwards.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by album2pdf operations.
#[derive(Debug, Error)]
pub enum Album2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The identifier list was empty or whitespace-only.
    #[error("No album IDs given. Pass at least one ID (one per line or separated by spaces).")]
    EmptyInput,

    // ── Record store errors ───────────────────────────────────────────────
    /// The record file exists but could not be read.
    #[error("Failed to read download records '{path}': {source}")]
    RecordRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record file was read but is not a valid record document.
    #[error("Download records '{path}' are corrupt: {source}")]
    RecordParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The record file could not be written.
    #[error("Failed to save download records to '{path}': {detail}")]
    RecordWrite { path: PathBuf, detail: String },

    // ── Workspace errors ──────────────────────────────────────────────────
    /// The scratch directory could not be reset after every attempt.
    #[error("Could not reset scratch directory '{path}' after {attempts} attempts: {detail}")]
    ScratchCleanup {
        path: PathBuf,
        attempts: u32,
        detail: String,
    },

    // ── Content service errors ────────────────────────────────────────────
    /// Album metadata could not be fetched for the identifier.
    #[error("Failed to look up album '{id}': {reason}")]
    LookupFailed { id: String, reason: String },

    /// An HTTP download (metadata or page image) failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// An HTTP request exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// A downloaded page image could not be decoded or re-encoded.
    #[error("Page {page} of album '{id}' is not a usable image: {detail}")]
    ImageDecode {
        id: String,
        page: usize,
        detail: String,
    },

    /// pdfium failed while building or saving the PDF.
    #[error("Failed to assemble PDF '{path}': {detail}")]
    PdfAssembly { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide, or set\n\
ALBUM2PDF_PDFIUM_LIB=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure for a single album identifier.
///
/// The batch continues with the next identifier; no record is written.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// Title lookup failed (invalid ID, unreachable service).
    #[error("{id}: detail lookup failed: {detail}")]
    LookupFailed { id: String, detail: String },

    /// Page download, decoding or PDF assembly failed.
    #[error("{id}: download failed: {detail}")]
    FetchFailed { id: String, detail: String },
}

impl ItemError {
    /// The identifier this failure belongs to.
    pub fn id(&self) -> &str {
        match self {
            ItemError::LookupFailed { id, .. } | ItemError::FetchFailed { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_cleanup_display() {
        let e = Album2PdfError::ScratchCleanup {
            path: PathBuf::from("/tmp/scratch"),
            attempts: 3,
            detail: "busy".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("/tmp/scratch"), "got: {msg}");
    }

    #[test]
    fn lookup_failed_display() {
        let e = Album2PdfError::LookupFailed {
            id: "4242".into(),
            reason: "HTTP 404".into(),
        };
        assert!(e.to_string().contains("4242"));
        assert!(e.to_string().contains("HTTP 404"));
    }

    #[test]
    fn item_error_names_identifier() {
        let e = ItemError::FetchFailed {
            id: "C".into(),
            detail: "connection reset".into(),
        };
        assert_eq!(e.id(), "C");
        assert!(e.to_string().starts_with("C:"));
        assert!(e.to_string().contains("connection reset"));
    }
}
