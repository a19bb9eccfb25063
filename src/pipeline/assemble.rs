//! PDF assembly: one image per page, written atomically to the output dir.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library driven through FFI; every call blocks. Assembly
//! runs on the blocking pool so the Tokio workers keep serving the event
//! channel while a several-hundred-page album is stitched together.
//!
//! Each page is sized to its image in points (1 px = 1 pt), so the PDF
//! shows the pages at their native aspect ratio with no margins.

use crate::error::Album2PdfError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Characters that are invalid in file names on at least one major platform.
static RE_INVALID_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).unwrap());

static RE_UNDERSCORE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Longest file stem we produce, in characters.
const MAX_STEM_CHARS: usize = 150;

/// Turn an album title into a safe file stem, falling back to `fallback`
/// (usually the album id) when nothing usable is left.
pub fn sanitize_file_stem(title: &str, fallback: &str) -> String {
    let replaced = RE_INVALID_FILE_CHARS.replace_all(title, "_");
    let collapsed = RE_UNDERSCORE_RUNS.replace_all(&replaced, "_");
    let trimmed: String = collapsed
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    let trimmed = trimmed.trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        if fallback == title {
            return "album".to_string();
        }
        return sanitize_file_stem(fallback, fallback);
    }
    trimmed.to_string()
}

/// Output file name for an album: the sanitised title plus `.pdf`.
pub fn pdf_file_name(title: &str, id: &str) -> String {
    format!("{}.pdf", sanitize_file_stem(title, id))
}

/// Bind to pdfium: an explicit library (file or directory), else the working
/// directory, else the system library path.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, Album2PdfError> {
    let bindings = match lib_path {
        Some(path) if path.is_dir() => Pdfium::bind_to_library(
            Pdfium::pdfium_platform_library_name_at_path(path),
        ),
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Album2PdfError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Assemble `pages` (in order) into a PDF at `output`.
pub async fn assemble_pdf(
    pages: Vec<PathBuf>,
    output: PathBuf,
    pdfium_lib: Option<PathBuf>,
) -> Result<PathBuf, Album2PdfError> {
    tokio::task::spawn_blocking(move || {
        assemble_pdf_blocking(&pages, &output, pdfium_lib.as_deref())?;
        Ok(output)
    })
    .await
    .map_err(|e| Album2PdfError::Internal(format!("Assembly task panicked: {}", e)))?
}

/// Blocking implementation of PDF assembly.
fn assemble_pdf_blocking(
    pages: &[PathBuf],
    output: &Path,
    pdfium_lib: Option<&Path>,
) -> Result<(), Album2PdfError> {
    let pdf_err = |detail: String| Album2PdfError::PdfAssembly {
        path: output.to_path_buf(),
        detail,
    };

    if pages.is_empty() {
        return Err(pdf_err("no pages to assemble".into()));
    }

    let pdfium = bind_pdfium(pdfium_lib)?;
    let mut document = pdfium
        .create_new_pdf()
        .map_err(|e| pdf_err(format!("{:?}", e)))?;

    for (idx, page_path) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let image = image::open(page_path)
            .map_err(|e| pdf_err(format!("page {}: {}", page_num, e)))?;

        let width = PdfPoints::new(image.width() as f32);
        let height = PdfPoints::new(image.height() as f32);

        let object = PdfPageImageObject::new_with_width(&document, &image, width)
            .map_err(|e| pdf_err(format!("page {}: {:?}", page_num, e)))?;

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::from_points(width, height))
            .map_err(|e| pdf_err(format!("page {}: {:?}", page_num, e)))?;

        page.objects_mut()
            .add_image_object(object)
            .map_err(|e| pdf_err(format!("page {}: {:?}", page_num, e)))?;

        debug!(
            "Placed page {} ({}x{} px)",
            page_num,
            image.width(),
            image.height()
        );
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| pdf_err(e.to_string()))?;
    }

    // Atomic write: save to temp, then rename
    let tmp_path = output.with_extension("pdf.tmp");
    document
        .save_to_file(&tmp_path)
        .map_err(|e| pdf_err(format!("{:?}", e)))?;
    std::fs::rename(&tmp_path, output).map_err(|e| pdf_err(e.to_string()))?;

    info!("Wrote {} ({} pages)", output.display(), pages.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_titles_are_kept() {
        assert_eq!(sanitize_file_stem("My Album", "1"), "My Album");
        assert_eq!(sanitize_file_stem("夏の本 vol.2", "1"), "夏の本 vol.2");
    }

    #[test]
    fn invalid_characters_replaced() {
        assert_eq!(sanitize_file_stem("a/b\\c:d*e?f", "1"), "a_b_c_d_e_f");
        assert_eq!(sanitize_file_stem("<<x>>", "1"), "_x_");
    }

    #[test]
    fn trailing_dots_and_spaces_trimmed() {
        assert_eq!(sanitize_file_stem("  Title...  ", "1"), "Title");
    }

    #[test]
    fn empty_title_falls_back_to_id() {
        assert_eq!(sanitize_file_stem("", "1198446"), "1198446");
        assert_eq!(sanitize_file_stem("???", "1198446"), "1198446");
        assert_eq!(sanitize_file_stem("", ""), "album");
    }

    #[test]
    fn long_titles_truncated() {
        let long = "x".repeat(400);
        assert_eq!(sanitize_file_stem(&long, "1").chars().count(), MAX_STEM_CHARS);
    }

    #[test]
    fn pdf_name_has_extension() {
        assert_eq!(pdf_file_name("Foo: Bar", "9"), "Foo_ Bar.pdf");
    }

    #[tokio::test]
    async fn no_pages_is_an_assembly_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = assemble_pdf(vec![], dir.path().join("x.pdf"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Album2PdfError::PdfAssembly { .. }));
    }
}
