//! Pipeline stages behind [`crate::source::HttpAlbumSource`].
//!
//! Each submodule implements exactly one step of turning an album ID into a
//! PDF, so every stage can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! detail ──▶ fetch ──▶ decode ──▶ assemble
//! (JSON)     (HTTP)    (→ JPEG)   (pdfium)
//! ```
//!
//! 1. [`detail`]   — `GET {api_base}/album/{id}` → title + page image list
//! 2. [`fetch`]    — concurrent page downloads into the scratch directory
//! 3. [`decode`]   — validate each page and normalise it to RGB JPEG
//! 4. [`assemble`] — one PDF page per image; runs in `spawn_blocking`
//!    because pdfium is not async-safe

pub mod assemble;
pub mod decode;
pub mod detail;
pub mod fetch;
