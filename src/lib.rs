//! # ade-ingest
//!
//! React to document uploads in an object store, parse them with LandingAI
//! ADE (Agentic Document Extraction) and write the results back beside them.
//!
//! ## Why this crate?
//!
//! The parse API does the hard part: layout analysis, OCR, tables. What is
//! left is glue that is easy to get subtly wrong. Output keys must be
//! reproducible so re-runs overwrite instead of duplicating. Chunk locations
//! arrive as page fractions that have to be mapped onto rendered pixels. And
//! the parser's response is loosely shaped. This crate keeps those three
//! pieces pure and tested, and delegates everything heavy to collaborators.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input/medical/report.pdf
//!  │
//!  ├─ 1. Keys     derive every output key (pure)
//!  ├─ 2. Skip     placeholder / outside prefix / already processed
//!  ├─ 3. Parse    multipart POST to ADE → markdown + chunks
//!  ├─ 4. Store    output/medical/report.md
//!  ├─ 5. Ground   output/medical_grounding/report_grounding.json
//!  │              output/medical_chunks/report_<chunk>.json
//!  └─ 6. Crop     output/medical_chunk_images/report_<chunk>.png (optional)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ade_ingest::{AdeClient, DocumentPipeline, FsObjectStore, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(FsObjectStore::new("./bucket"));
//!     let parser = Arc::new(AdeClient::from_env()?);
//!     let pipeline = DocumentPipeline::new(store, parser, PipelineConfig::from_env()?);
//!
//!     let report = pipeline.process_keys(["input/medical/report.pdf"]).await;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ade-ingest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `s3`    | on      | Amazon S3 object store (aws-sdk-s3) |
//!
//! Disable both when embedding the library against your own store:
//! ```toml
//! ade-ingest = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod crop;
pub mod error;
pub mod event;
pub mod geometry;
pub mod grounding;
pub mod keys;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod store;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use crop::{AnnotationRequest, ChunkImageRequest, CropOptions, CropOutcome, ImageCropper};
pub use error::{IngestError, SkipReason};
pub use event::{ObjectRef, S3Event};
pub use geometry::{map_box_to_pixels, CropRegion, NormalizedBox, PageDimensions, PixelBox};
pub use grounding::{build_grounding_record, chunk_documents, GroundingRecord, ParseResponse};
pub use keys::{derive_output_keys, OutputKeySet, Prefix};
pub use output::{BatchReport, DocumentOutcome, DocumentStatus};
pub use pipeline::parser::{AdeClient, DocumentParser};
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RenderedPage};
pub use process::DocumentPipeline;
pub use progress::{BatchProgressCallback, NoopProgressCallback};
#[cfg(feature = "s3")]
pub use store::S3ObjectStore;
pub use store::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use upload::{upload_directory, UploadOptions, UploadSummary};
