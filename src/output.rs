//! Result types returned by the pipeline.
//!
//! A batch never fails as a whole: each document gets its own
//! [`DocumentOutcome`], and the [`BatchReport`] wrapping them always has
//! `status: "ok"`. Callers inspect per-document status to decide what to
//! retry.

use crate::error::SkipReason;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What happened to one input key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Success,
    Skipped,
    Failed,
}

/// Per-document result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// The input key as received.
    pub source: String,

    /// Markdown key, present whenever the key mapped to a document.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output: Option<String>,

    pub status: DocumentStatus,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<SkipReason>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,

    /// Number of per-chunk JSON records written.
    #[serde(default)]
    pub chunk_files: usize,

    /// Number of chunk crops written or found already present.
    #[serde(default)]
    pub chunk_images: usize,

    /// Non-fatal problems (grounding or crop writes that failed after the
    /// markdown landed).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

impl DocumentOutcome {
    pub fn success(source: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output: Some(output.into()),
            status: DocumentStatus::Success,
            reason: None,
            error: None,
            chunk_files: 0,
            chunk_images: 0,
            warnings: Vec::new(),
        }
    }

    pub fn skipped(source: impl Into<String>, output: Option<String>, reason: SkipReason) -> Self {
        Self {
            status: DocumentStatus::Skipped,
            output,
            reason: Some(reason),
            ..Self::success(source, String::new())
        }
    }

    pub fn failed(source: impl Into<String>, output: Option<String>, error: impl ToString) -> Self {
        Self {
            status: DocumentStatus::Failed,
            output,
            error: Some(error.to_string()),
            ..Self::success(source, String::new())
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DocumentStatus::Success
    }
}

/// Result of a batch invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Always `"ok"`; individual failures live in `results`.
    pub status: String,
    pub results: Vec<DocumentOutcome>,
}

impl BatchReport {
    pub fn new(results: Vec<DocumentOutcome>) -> Self {
        Self {
            status: "ok".to_string(),
            results,
        }
    }

    pub fn count(&self, status: DocumentStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(DocumentStatus::Success)
    }

    pub fn skipped(&self) -> usize {
        self.count(DocumentStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(DocumentStatus::Failed)
    }
}

/// Group keys under `prefix` by their first path segment below it.
///
/// `output/medical/a.md` and `output/medical_grounding/a_grounding.json`
/// land in `medical` and `medical_grounding`; keys directly under the prefix
/// are grouped under `""`. Folder placeholders (keys ending in `/`) are
/// dropped.
pub fn group_by_folder<'a, I>(keys: I, prefix: &str) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in keys {
        if key.ends_with('/') {
            continue;
        }
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        let folder = match rest.split_once('/') {
            Some((first, _)) => first.to_string(),
            None => String::new(),
        };
        groups.entry(folder).or_default().push(key.to_string());
    }
    for keys in groups.values_mut() {
        keys.sort();
    }
    groups
}
