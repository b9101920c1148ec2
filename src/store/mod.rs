//! Object storage: the bucket the pipeline reads uploads from and writes
//! results back into.
//!
//! Everything above this module speaks in slash-delimited keys; how they map
//! onto a backend is the implementation's business.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`MemoryObjectStore`] | tests and dry runs |
//! | [`FsObjectStore`] | a local directory standing in for a bucket |
//! | `S3ObjectStore` | Amazon S3 (feature `s3`) |

use crate::error::IngestError;
use async_trait::async_trait;

pub mod fs;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

/// Content types used for pipeline outputs.
pub mod content_type {
    pub const MARKDOWN: &str = "text/markdown";
    pub const JSON: &str = "application/json";
    pub const PNG: &str = "image/png";
    pub const OCTET_STREAM: &str = "application/octet-stream";
    pub const DIRECTORY: &str = "application/x-directory";
}

/// A flat key → bytes store.
///
/// `exists` reports absence as `Ok(false)`; only real failures (permissions,
/// network) are errors. `get` on a missing key returns
/// [`IngestError::ObjectNotFound`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, IngestError>;

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), IngestError>;

    async fn exists(&self, key: &str) -> Result<bool, IngestError>;

    /// All keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, IngestError>;

    /// Human-readable location of `key` (`s3://bucket/key`, a file path, …).
    fn location(&self, key: &str) -> String;
}

/// Guess a content type from a key's extension, for uploads.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => content_type::PNG,
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "md" => content_type::MARKDOWN,
        "json" => content_type::JSON,
        "txt" => "text/plain",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => content_type::OCTET_STREAM,
    }
}
