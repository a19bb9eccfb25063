//! Scratch-directory reset between albums.
//!
//! The fetch stage writes every page image of the current album into a
//! shared scratch directory. Wiping it after each album keeps disk use
//! bounded over long batches and guarantees that leftovers from a failed
//! album are never picked up by the next one's assembly step.
//!
//! Removal is best-effort (individual entries that refuse to go are
//! ignored); the attempt only counts as failed when the empty directory
//! cannot be recreated, e.g. because something still holds the path.

use crate::error::Album2PdfError;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Wipe and recreate `dir`, retrying up to `max_attempts` times with a fixed
/// `backoff` between attempts.
///
/// Returns the attempt number that succeeded. Never panics; on exhaustion
/// the error carries the last failure and the caller decides how to report it.
pub async fn reset_scratch_dir(
    dir: &Path,
    max_attempts: u32,
    backoff: Duration,
) -> Result<u32, Album2PdfError> {
    let max_attempts = max_attempts.max(1);
    let mut last_err = String::new();

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            sleep(backoff).await;
        }

        match try_reset(dir).await {
            Ok(()) => {
                debug!("Scratch directory {} reset (attempt {})", dir.display(), attempt);
                return Ok(attempt);
            }
            Err(e) => {
                warn!(
                    "Scratch reset failed ({}/{}) for {}: {}",
                    attempt,
                    max_attempts,
                    dir.display(),
                    e
                );
                last_err = e.to_string();
            }
        }
    }

    Err(Album2PdfError::ScratchCleanup {
        path: dir.to_path_buf(),
        attempts: max_attempts,
        detail: last_err,
    })
}

async fn try_reset(dir: &Path) -> std::io::Result<()> {
    let is_dir = tokio::fs::metadata(dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir {
        remove_tree_best_effort(dir).await;
    }
    tokio::fs::create_dir_all(dir).await?;
    if !tokio::fs::metadata(dir).await?.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "path exists and is not a directory",
        ));
    }
    Ok(())
}

/// Remove `dir` recursively, ignoring errors from individual entries.
async fn remove_tree_best_effort(dir: &Path) {
    if tokio::fs::remove_dir_all(dir).await.is_ok() {
        return;
    }

    // Something refused to go; delete what we can entry by entry.
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        let result = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        if let Err(e) = result {
            debug!("Leaving {} in scratch: {}", path.display(), e);
        }
    }
}
