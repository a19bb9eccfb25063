//! The content-service seam: metadata lookup and fetch-and-assemble.
//!
//! [`AlbumSource`] is everything the batch controller needs from the
//! outside world. [`HttpAlbumSource`] is the stock implementation: it talks
//! JSON over HTTP and drives the [`crate::pipeline`] stages to turn an
//! album's page images into one PDF. Tests and embedders plug in their own.

use crate::config::DownloaderConfig;
use crate::error::Album2PdfError;
use crate::pipeline::{assemble, detail, fetch};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Album metadata returned by the content service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumDetail {
    /// Identifier the album was requested under.
    #[serde(default)]
    pub id: String,
    /// Human-readable title; also names the output PDF.
    pub title: String,
    /// Page image locations in reading order: absolute URLs or paths
    /// relative to the API base.
    #[serde(default)]
    pub images: Vec<String>,
}

/// External collaborator that knows how to resolve and build albums.
#[async_trait]
pub trait AlbumSource: Send + Sync {
    /// Fetch title metadata for `id`.
    async fn lookup_detail(&self, id: &str) -> Result<AlbumDetail, Album2PdfError>;

    /// Download every page of the album and assemble the PDF.
    ///
    /// Returns the path of the finished artifact in the output directory.
    async fn fetch_and_assemble(&self, detail: &AlbumDetail) -> Result<PathBuf, Album2PdfError>;
}

/// JSON-over-HTTP content service client.
///
/// * `GET {api_base}/album/{id}` → [`AlbumDetail`]
/// * each entry of `images` → one page, downloaded into the scratch directory,
///   normalised to JPEG and placed on its own PDF page.
#[derive(Debug, Clone)]
pub struct HttpAlbumSource {
    client: reqwest::Client,
    api_base: String,
    config: DownloaderConfig,
}

impl HttpAlbumSource {
    /// Build a client from the configuration. Requires `api_base`.
    pub fn new(config: &DownloaderConfig) -> Result<Self, Album2PdfError> {
        let api_base = config.api_base.clone().ok_or_else(|| {
            Album2PdfError::InvalidConfig(
                "No content service configured. Set --api-base or ALBUM2PDF_API_BASE.".into(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("album2pdf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Album2PdfError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl AlbumSource for HttpAlbumSource {
    async fn lookup_detail(&self, id: &str) -> Result<AlbumDetail, Album2PdfError> {
        detail::lookup(
            &self.client,
            &self.api_base,
            id,
            self.config.request_timeout_secs,
        )
        .await
    }

    async fn fetch_and_assemble(&self, detail: &AlbumDetail) -> Result<PathBuf, Album2PdfError> {
        let album_dir = self
            .config
            .scratch_dir()
            .join(assemble::sanitize_file_stem(&detail.id, &detail.id));

        let pages = fetch::download_pages(
            &self.client,
            detail,
            &self.api_base,
            &album_dir,
            self.config.image_concurrency,
            self.config.request_timeout_secs,
        )
        .await?;
        info!("Album {}: {} pages downloaded", detail.id, pages.len());

        let output = self
            .config
            .output_dir
            .join(assemble::pdf_file_name(&detail.title, &detail.id));

        assemble::assemble_pdf(pages, output, self.config.pdfium_lib_path.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_api_base() {
        let config = DownloaderConfig::default();
        assert!(matches!(
            HttpAlbumSource::new(&config),
            Err(Album2PdfError::InvalidConfig(_))
        ));
    }

    #[test]
    fn detail_parses_minimal_document() {
        let detail: AlbumDetail = serde_json::from_str(r#"{"title": "Foo"}"#).unwrap();
        assert_eq!(detail.title, "Foo");
        assert!(detail.id.is_empty());
        assert!(detail.images.is_empty());
    }
}
