//! Page decoding: whatever the service sends (PNG, JPEG, WebP) → baseline JPEG.
//!
//! Every page is decoded once right after download. A truncated or bogus
//! image therefore fails the album here, with the page number attached,
//! instead of surfacing as an opaque pdfium error during assembly. Storing
//! all pages as RGB JPEG also keeps the scratch directory uniform.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// JPEG quality used when re-encoding pages.
pub const JPEG_QUALITY: u8 = 90;

/// Decode `bytes` and re-encode them as an RGB JPEG.
pub fn normalize_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = (img.width(), img.height());

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;

    debug!("Normalised {}x{} page → {} bytes JPEG", width, height, buf.len());
    Ok(buf)
}
