//! External collaborators of the ingestion pipeline.
//!
//! Each submodule wraps exactly one outside capability behind a narrow
//! interface, so the orchestration in [`crate::process`] and [`crate::crop`]
//! can be exercised with in-memory fakes.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ parser ──▶ ParseResponse
//! bytes ──▶ render ──▶ page image ──▶ canvas ──▶ PNG
//! (store)   (ADE/pdfium)             (draw/encode)
//! ```
//!
//! 1. [`parser`]: multipart POST to the ADE parse API; the only stage with
//!    network I/O besides the store
//! 2. [`render`]: rasterise one page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`canvas`]: outline, tint and PNG-encode rendered pages

pub mod canvas;
pub mod parser;
pub mod render;
