//! Bulk upload of a local directory into the input prefix.
//!
//! Mirrors the directory tree: `docs/medical/a.pdf` uploaded with prefix
//! `input/` becomes `input/medical/a.pdf`, which the pipeline then maps to
//! `output/medical/...`.

use crate::error::IngestError;
use crate::keys::Prefix;
use crate::store::{content_type_for, ObjectStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Upload behaviour.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Keep only files with these extensions (case-insensitive, with or
    /// without the leading dot). Empty means every file.
    pub extensions: Vec<String>,
    /// Leave keys that already exist untouched. Default: true.
    pub skip_existing: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            skip_existing: true,
        }
    }
}

impl UploadOptions {
    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
    /// Files left out by the extension filter.
    pub filtered: usize,
}

/// Upload every file below `local_dir` under `prefix`.
pub async fn upload_directory(
    store: &dyn ObjectStore,
    local_dir: &Path,
    prefix: &Prefix,
    options: &UploadOptions,
) -> Result<UploadSummary, IngestError> {
    info!(
        "Uploading {} → {}",
        local_dir.display(),
        store.location(prefix.as_str())
    );

    let mut summary = UploadSummary::default();
    for path in collect_files(local_dir).await? {
        if !options.accepts(&path) {
            summary.filtered += 1;
            continue;
        }
        let Some(key) = object_key(local_dir, &path, prefix) else {
            continue;
        };

        if options.skip_existing && store.exists(&key).await? {
            debug!("Skipping (already exists): {}", key);
            summary.skipped.push(key);
            continue;
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| IngestError::LocalRead {
                path: path.clone(),
                source,
            })?;
        store.put(&key, bytes, content_type_for(&key)).await?;
        debug!("Uploaded {}", key);
        summary.uploaded.push(key);
    }

    info!(
        "Uploaded {} files, skipped {} existing files",
        summary.uploaded.len(),
        summary.skipped.len()
    );
    Ok(summary)
}

fn object_key(root: &Path, path: &Path, prefix: &Prefix) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("{}{}", prefix.as_str(), parts.join("/")))
}

/// Every regular file below `root`, sorted.
async fn collect_files(root: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let read_err = |path: &Path, source| IngestError::LocalRead {
        path: path.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| read_err(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| read_err(&dir, e))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| read_err(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
