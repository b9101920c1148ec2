//! Local directory used as a bucket.
//!
//! Keys map to paths under `root`. A key ending in `/` is a folder
//! placeholder and maps to a directory. Writes go to a uniquely named
//! sibling temp file that is renamed into place, so readers never see partial
//! objects.

use super::ObjectStore;
use crate::error::IngestError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, rejecting anything that could
    /// escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, IngestError> {
        let invalid = |reason: &str| IngestError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if key.starts_with('/') || key.contains('\\') {
            return Err(invalid("must be a relative slash-delimited key"));
        }
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(invalid("'..' and absolute segments are not allowed")),
            }
        }
        Ok(self.root.join(relative))
    }

    fn store_error(key: &str, e: impl std::fmt::Display) -> IngestError {
        IngestError::Store {
            key: key.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, IngestError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(IngestError::ObjectNotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(Self::store_error(key, e)),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), IngestError> {
        let path = self.resolve(key)?;

        if key.ends_with('/') {
            return tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| Self::store_error(key, e));
        }

        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| Self::store_error(key, e))?;

        // Every write stages under its own random name, so concurrent puts
        // to one key never share a temp file; the last rename wins.
        let len = bytes.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| IngestError::Internal(format!("write task panicked: {e}")))?
        .map_err(|e| Self::store_error(key, e))?;

        debug!("Wrote {} ({} bytes)", path.display(), len);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, IngestError> {
        let path = self.resolve(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(if key.ends_with('/') {
                meta.is_dir()
            } else {
                meta.is_file()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::store_error(key, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, IngestError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Self::store_error(prefix, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Self::store_error(prefix, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Self::store_error(prefix, e))?;
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let mut key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if file_type.is_dir() {
                    key.push('/');
                    pending.push(path);
                }
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn location(&self, key: &str) -> String {
        self.root.join(key).display().to_string()
    }
}
