//! Configuration types for album downloads.
//!
//! All downloader behaviour is controlled through [`DownloaderConfig`], built
//! via its [`DownloaderConfigBuilder`]. The directory layout (output root,
//! scratch area, record file) and the scratch-cleanup retry policy all live
//! here so a batch can be reproduced from a single value.

use crate::error::Album2PdfError;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// File name of the record store inside the output directory.
pub const RECORD_FILE_NAME: &str = "downloaded_records.json";

/// Name of the scratch subdirectory inside the output directory.
pub const SCRATCH_DIR_NAME: &str = "temp_images";

/// Configuration for downloading albums and assembling PDFs.
///
/// Built via [`DownloaderConfig::builder()`] or using
/// [`DownloaderConfig::default()`].
///
/// # Example
/// ```rust
/// use album2pdf::DownloaderConfig;
///
/// let config = DownloaderConfig::builder()
///     .output_dir("/srv/albums")
///     .cleanup_attempts(5)
///     .image_concurrency(8)
///     .build()
///     .unwrap();
/// assert!(config.record_file().ends_with("downloaded_records.json"));
/// ```
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Directory receiving finished PDF files. Default: `albums`.
    pub output_dir: PathBuf,

    /// Scratch directory for per-album page images.
    /// If None, uses `<output_dir>/temp_images`.
    ///
    /// Everything inside is disposable: it is wiped after every album.
    pub scratch_dir: Option<PathBuf>,

    /// JSON file recording completed albums.
    /// If None, uses `<output_dir>/downloaded_records.json`.
    pub record_file: Option<PathBuf>,

    /// Total attempts for resetting the scratch directory. Default: 3.
    pub cleanup_attempts: u32,

    /// Fixed pause between scratch-reset attempts in milliseconds. Default: 1000.
    pub cleanup_backoff_ms: u64,

    /// Concurrent page-image requests per album. Default: 20.
    ///
    /// Albums are processed one at a time; this only bounds the fan-out
    /// inside a single album download.
    pub image_concurrency: usize,

    /// Per-request HTTP timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Base URL of the content service, e.g. `https://gallery.example.com/api`.
    /// Required only by [`crate::source::HttpAlbumSource`].
    pub api_base: Option<String>,

    /// Capacity of the batch event channel. Default: 64.
    pub event_buffer: usize,

    /// Explicit path to the pdfium shared library.
    /// If None, the working directory and then the system library path are tried.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("albums"),
            scratch_dir: None,
            record_file: None,
            cleanup_attempts: 3,
            cleanup_backoff_ms: 1000,
            image_concurrency: 20,
            request_timeout_secs: 60,
            api_base: None,
            event_buffer: 64,
            pdfium_lib_path: None,
        }
    }
}

impl DownloaderConfig {
    /// Create a new builder for `DownloaderConfig`.
    pub fn builder() -> DownloaderConfigBuilder {
        DownloaderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolved scratch directory.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(SCRATCH_DIR_NAME))
    }

    /// Resolved record file path.
    pub fn record_file(&self) -> PathBuf {
        self.record_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join(RECORD_FILE_NAME))
    }

    /// Pause between scratch-reset attempts.
    pub fn cleanup_backoff(&self) -> Duration {
        Duration::from_millis(self.cleanup_backoff_ms)
    }

    /// Create the output and scratch directories if they are missing.
    pub async fn ensure_dirs(&self) -> Result<(), Album2PdfError> {
        for dir in [self.output_dir.clone(), self.scratch_dir()] {
            create_dir(&dir).await?;
        }
        Ok(())
    }
}

async fn create_dir(dir: &Path) -> Result<(), Album2PdfError> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        Album2PdfError::InvalidConfig(format!("cannot create directory {}: {}", dir.display(), e))
    })
}

/// Builder for [`DownloaderConfig`].
#[derive(Debug)]
pub struct DownloaderConfigBuilder {
    config: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn record_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.record_file = Some(path.into());
        self
    }

    pub fn cleanup_attempts(mut self, n: u32) -> Self {
        self.config.cleanup_attempts = n;
        self
    }

    pub fn cleanup_backoff_ms(mut self, ms: u64) -> Self {
        self.config.cleanup_backoff_ms = ms;
        self
    }

    pub fn image_concurrency(mut self, n: usize) -> Self {
        self.config.image_concurrency = n.max(1);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn event_buffer(mut self, n: usize) -> Self {
        self.config.event_buffer = n;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DownloaderConfig, Album2PdfError> {
        let c = &self.config;
        if c.cleanup_attempts == 0 {
            return Err(Album2PdfError::InvalidConfig(
                "Cleanup attempts must be ≥ 1".into(),
            ));
        }
        if c.event_buffer == 0 {
            return Err(Album2PdfError::InvalidConfig(
                "Event buffer must be ≥ 1".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(Album2PdfError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref base) = c.api_base {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(Album2PdfError::InvalidConfig(format!(
                    "API base must be an HTTP/HTTPS URL, got '{}'",
                    base
                )));
            }
        }
        check_scratch_placement(c)?;
        Ok(self.config)
    }
}

/// The scratch directory is wiped after every album, so it must not be, or
/// contain, the output directory or the record file.
fn check_scratch_placement(config: &DownloaderConfig) -> Result<(), Album2PdfError> {
    let scratch = absolute_lexical(&config.scratch_dir())?;
    let output = absolute_lexical(&config.output_dir)?;
    let record = absolute_lexical(&config.record_file())?;

    if output.starts_with(&scratch) {
        return Err(Album2PdfError::InvalidConfig(format!(
            "Scratch directory {} would wipe the output directory {}",
            scratch.display(),
            output.display()
        )));
    }
    if record.starts_with(&scratch) {
        return Err(Album2PdfError::InvalidConfig(format!(
            "Scratch directory {} would wipe the record file {}",
            scratch.display(),
            record.display()
        )));
    }
    Ok(())
}

/// Absolute form of `path` with `.` and `..` resolved without touching the
/// filesystem.
fn absolute_lexical(path: &Path) -> Result<PathBuf, Album2PdfError> {
    let absolute = std::path::absolute(path).map_err(|e| {
        Album2PdfError::InvalidConfig(format!("cannot resolve {}: {}", path.display(), e))
    })?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}
