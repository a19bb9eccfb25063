//! Album metadata lookup: `GET {api_base}/album/{id}`.

use crate::error::Album2PdfError;
use crate::source::AlbumDetail;
use reqwest::{Client, Url};
use tracing::debug;

/// Build the metadata URL for `id`, percent-encoding the identifier as a
/// single path segment.
pub fn album_url(api_base: &str, id: &str) -> Result<Url, Album2PdfError> {
    let mut url = Url::parse(api_base)
        .map_err(|e| Album2PdfError::InvalidConfig(format!("bad API base '{}': {}", api_base, e)))?;
    url.path_segments_mut()
        .map_err(|_| Album2PdfError::InvalidConfig(format!("API base '{}' cannot be a base URL", api_base)))?
        .pop_if_empty()
        .push("album")
        .push(id);
    Ok(url)
}

/// Fetch and parse album metadata.
pub async fn lookup(
    client: &Client,
    api_base: &str,
    id: &str,
    timeout_secs: u64,
) -> Result<AlbumDetail, Album2PdfError> {
    let url = album_url(api_base, id)?;
    debug!("Looking up album {} at {}", id, url);

    let response = client.get(url.clone()).send().await.map_err(|e| {
        if e.is_timeout() {
            Album2PdfError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Album2PdfError::LookupFailed {
                id: id.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Album2PdfError::LookupFailed {
            id: id.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Album2PdfError::LookupFailed {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

    parse_detail(id, &body)
}

/// Parse a metadata document, filling in the requested id when the service
/// omits it. Blank titles are rejected.
pub fn parse_detail(id: &str, body: &[u8]) -> Result<AlbumDetail, Album2PdfError> {
    let mut detail: AlbumDetail =
        serde_json::from_slice(body).map_err(|e| Album2PdfError::LookupFailed {
            id: id.to_string(),
            reason: format!("invalid album metadata: {}", e),
        })?;

    if detail.title.trim().is_empty() {
        return Err(Album2PdfError::LookupFailed {
            id: id.to_string(),
            reason: "album metadata has no title".into(),
        });
    }
    if detail.id.is_empty() {
        detail.id = id.to_string();
    }
    Ok(detail)
}
