//! Download records: which albums were already turned into PDFs.
//!
//! The store keeps an in-memory map `id → DownloadRecord` loaded once at
//! construction and rewrites the whole JSON file after every insertion.
//! It is the only authority on "already downloaded"; the batch controller
//! reads it and requests writes but never touches the file itself.
//!
//! ## File format
//!
//! ```json
//! {
//!   "1198446": {
//!     "title": "Some album",
//!     "download_time": "2024-05-01 21:14:03"
//!   }
//! }
//! ```
//!
//! ## Failure policy
//!
//! A missing or corrupt file yields an empty store (logged, never fatal).
//! A failed write is returned to the caller, but the in-memory map keeps the
//! new record either way: within one process `add_record` followed by
//! `is_downloaded` is always `true`.

use crate::error::Album2PdfError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Returned by [`RecordStore::get_title`] for identifiers with no record.
pub const UNKNOWN_TITLE: &str = "unknown title";

/// Local-clock timestamp format, second precision.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Completion marker for one album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Human-readable album title, as fetched when the album was processed.
    pub title: String,
    /// Local time the PDF was completed, formatted with [`TIME_FORMAT`].
    #[serde(rename = "download_time", default)]
    pub completed_at: String,
}

impl DownloadRecord {
    /// A record stamped with the current local time.
    pub fn now(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            completed_at: chrono::Local::now().format(TIME_FORMAT).to_string(),
        }
    }
}

type RecordMap = BTreeMap<String, DownloadRecord>;

/// Durable set of processed album identifiers.
///
/// Shared between the batch worker (the only writer) and any number of
/// readers via `Arc<RecordStore>`.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    records: RwLock<RecordMap>,
    /// Serialises persistence so the file never lags behind a newer snapshot.
    writer: Mutex<()>,
}

impl RecordStore {
    /// Open the store at `path`, degrading to an empty store when the file is
    /// missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match load_records(&path) {
            Ok(records) => {
                info!("Loaded {} download records from {}", records.len(), path.display());
                records
            }
            Err(e) => {
                warn!("{}; starting with an empty record set", e);
                RecordMap::new()
            }
        };
        Self {
            path,
            records: RwLock::new(records),
            writer: Mutex::new(()),
        }
    }

    /// Path of the backing record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `id` has a completion record.
    pub fn is_downloaded(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Stored title for `id`, or [`UNKNOWN_TITLE`].
    pub fn get_title(&self, id: &str) -> String {
        self.read()
            .get(id)
            .map(|r| r.title.clone())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
    }

    /// Full record for `id`, if any.
    pub fn get(&self, id: &str) -> Option<DownloadRecord> {
        self.read().get(id).cloned()
    }

    /// Snapshot of every record, sorted by identifier.
    pub fn records(&self) -> Vec<(String, DownloadRecord)> {
        self.read()
            .iter()
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Insert or overwrite the record for `id`, then rewrite the record file.
    ///
    /// The in-memory map is updated before the write is attempted, so an
    /// `Err` here only means the record may not survive a restart.
    pub fn add_record(&self, id: &str, title: &str) -> Result<(), Album2PdfError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let json = {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            records.insert(id.to_string(), DownloadRecord::now(title));
            serde_json::to_string_pretty(&*records).map_err(|e| Album2PdfError::RecordWrite {
                path: self.path.clone(),
                detail: e.to_string(),
            })?
        };

        write_atomic(&self.path, json.as_bytes())?;
        debug!("Recorded album {} in {}", id, self.path.display());
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RecordMap> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read and parse the record file. A missing file is an empty map.
pub fn load_records(path: &Path) -> Result<BTreeMap<String, DownloadRecord>, Album2PdfError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RecordMap::new()),
        Err(e) => {
            return Err(Album2PdfError::RecordRead {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    serde_json::from_str(&text).map_err(|e| Album2PdfError::RecordParse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Atomic write: temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Album2PdfError> {
    let write_err = |detail: String| Album2PdfError::RecordWrite {
        path: path.to_path_buf(),
        detail,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| write_err(e.to_string()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| write_err(e.to_string()))?;
    tmp.write_all(bytes).map_err(|e| write_err(e.to_string()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| write_err(e.to_string()))?;
    tmp.persist(path).map_err(|e| write_err(e.to_string()))?;
    Ok(())
}
