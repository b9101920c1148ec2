//! Error types for the ade-ingest library.
//!
//! Two distinct types reflect two distinct situations:
//!
//! * [`IngestError`]: an operation failed, such as a store read or a
//!   rejected parse request. In a batch these are captured into the per-document
//!   [`crate::output::DocumentOutcome`] so one bad upload never aborts the
//!   others.
//!
//! * [`SkipReason`]: not an error at all. Directory placeholders, keys
//!   outside the input prefix and already-processed documents are expected
//!   events when reacting to bucket notifications, and are reported as
//!   `skipped`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the ade-ingest library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Object store errors ───────────────────────────────────────────────
    /// `get` was called for a key that does not exist.
    #[error("Object not found: '{key}'")]
    ObjectNotFound { key: String },

    /// Any other store failure (network, permissions, local I/O).
    #[error("Object store error on '{key}': {reason}")]
    Store { key: String, reason: String },

    /// A key would escape the root of a filesystem store.
    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    // ── Parser errors ─────────────────────────────────────────────────────
    /// The request never produced an HTTP response.
    #[error("Parse request failed: {reason}")]
    ParserRequest { reason: String },

    /// The parsing service answered with a non-success status.
    #[error("Parse API returned HTTP {status}: {body}")]
    ParserStatus { status: u16, body: String },

    /// The parse call exceeded the configured timeout.
    #[error("Parse request timed out after {secs}s")]
    ParserTimeout { secs: u64 },

    /// The response body was not the JSON we expected.
    #[error("Could not decode parse response: {reason}")]
    ParserResponse { reason: String },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// pdfium could not open the document or render the page.
    #[error("Rendering failed for page {page}: {detail}")]
    Render { page: usize, detail: String },

    /// PNG encoding of a rendered or cropped page failed.
    #[error("Image encoding failed: {0}")]
    ImageEncode(#[from] image::ImageError),

    // ── Local I/O ─────────────────────────────────────────────────────────
    /// Reading a local file for upload failed.
    #[error("Failed to read '{path}': {source}")]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A notification payload could not be decoded.
    #[error("Invalid event payload: {0}")]
    InvalidEvent(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a document was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The key ends in `/`: a folder placeholder, not a document.
    DirectoryPlaceholder,
    /// The key does not live under the configured input prefix.
    OutsideInputFolder,
    /// The key is exactly the input prefix or has no file name.
    EmptyFilename,
    /// The markdown output already exists and reprocessing is not forced.
    AlreadyProcessed,
}

impl SkipReason {
    /// Stable string used in outcome records and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::DirectoryPlaceholder => "directory_placeholder",
            SkipReason::OutsideInputFolder => "outside_input_folder",
            SkipReason::EmptyFilename => "empty_filename",
            SkipReason::AlreadyProcessed => "already_processed",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
