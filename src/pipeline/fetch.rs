//! Page download: fetch every image of an album into the scratch directory.
//!
//! Pages are requested concurrently (`image_concurrency` in flight) and each
//! one is decoded and rewritten as `NNNN.jpg` as soon as it arrives. The
//! returned paths are in reading order regardless of completion order. The
//! first failing page fails the whole album; the partial files are left for
//! the scratch reset to sweep away.

use super::decode;
use crate::error::Album2PdfError;
use crate::source::AlbumDetail;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Client, Url};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve an image reference against the API base. Absolute URLs pass
/// through untouched.
pub fn resolve_image_url(api_base: &str, raw: &str) -> Result<Url, Album2PdfError> {
    if let Ok(url) = Url::parse(raw) {
        return Ok(url);
    }
    let base = Url::parse(&format!("{}/", api_base.trim_end_matches('/')))
        .map_err(|e| Album2PdfError::InvalidConfig(format!("bad API base '{}': {}", api_base, e)))?;
    base.join(raw.trim_start_matches('/'))
        .map_err(|e| Album2PdfError::DownloadFailed {
            url: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Scratch file name for a 1-indexed page.
pub fn page_file_name(page_num: usize) -> String {
    format!("{:04}.jpg", page_num)
}

/// Download, decode and store every page of `detail` under `album_dir`.
pub async fn download_pages(
    client: &Client,
    detail: &AlbumDetail,
    api_base: &str,
    album_dir: &Path,
    concurrency: usize,
    timeout_secs: u64,
) -> Result<Vec<PathBuf>, Album2PdfError> {
    if detail.images.is_empty() {
        return Err(Album2PdfError::DownloadFailed {
            url: format!("album {}", detail.id),
            reason: "album has no pages".into(),
        });
    }

    tokio::fs::create_dir_all(album_dir)
        .await
        .map_err(|e| Album2PdfError::Internal(format!("cannot create {}: {}", album_dir.display(), e)))?;

    let mut jobs = Vec::with_capacity(detail.images.len());
    for (idx, raw) in detail.images.iter().enumerate() {
        let page_num = idx + 1;
        jobs.push((
            page_num,
            resolve_image_url(api_base, raw)?,
            album_dir.join(page_file_name(page_num)),
        ));
    }

    let fetches = jobs.into_iter().map(|(page_num, url, dest)| {
        let client = client.clone();
        let id = detail.id.clone();
        async move { fetch_page(&client, &id, page_num, url, dest, timeout_secs).await }
    });
    collect_pages(fetches, concurrency).await
}

/// Run page futures `concurrency` at a time and return their paths in page
/// order. The first error drops every request still in flight.
async fn collect_pages<I, F>(fetches: I, concurrency: usize) -> Result<Vec<PathBuf>, Album2PdfError>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<(usize, PathBuf), Album2PdfError>>,
{
    let mut pages: Vec<(usize, PathBuf)> = stream::iter(fetches)
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;
    pages.sort_unstable_by_key(|(page_num, _)| *page_num);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

async fn fetch_page(
    client: &Client,
    id: &str,
    page_num: usize,
    url: Url,
    dest: PathBuf,
    timeout_secs: u64,
) -> Result<(usize, PathBuf), Album2PdfError> {
    let bytes = get_bytes(client, &url, timeout_secs).await?;

    let jpeg = tokio::task::spawn_blocking(move || decode::normalize_to_jpeg(&bytes))
        .await
        .map_err(|e| Album2PdfError::Internal(format!("decode task panicked: {}", e)))?
        .map_err(|e| Album2PdfError::ImageDecode {
            id: id.to_string(),
            page: page_num,
            detail: e.to_string(),
        })?;

    tokio::fs::write(&dest, &jpeg)
        .await
        .map_err(|e| Album2PdfError::Internal(format!("cannot write {}: {}", dest.display(), e)))?;

    debug!("Album {}: page {} → {}", id, page_num, dest.display());
    Ok((page_num, dest))
}

async fn get_bytes(client: &Client, url: &Url, timeout_secs: u64) -> Result<Vec<u8>, Album2PdfError> {
    let failed = |reason: String| Album2PdfError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let response = client.get(url.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            Album2PdfError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    Ok(bytes.to_vec())
}
