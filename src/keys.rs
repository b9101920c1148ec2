//! Output key derivation: map one uploaded document to its family of outputs.
//!
//! Every artifact the pipeline writes for a document is addressed by a key
//! computed here, from nothing but the input key and the two configured
//! prefixes. Keeping this pure makes the layout reproducible: the same upload
//! always lands in the same places, so re-runs overwrite instead of
//! duplicating.
//!
//! ## Layout
//!
//! ```text
//! input/medical/sub/report.pdf
//!   ├─ output/medical/sub/report.md                          markdown
//!   ├─ output/medical_grounding/sub/report_grounding.json    grounding record
//!   ├─ output/medical_chunks/report_<chunk>.json             one per chunk
//!   └─ output/medical_chunk_images/report_<chunk>.png        crops
//! ```
//!
//! The grounding/chunk sibling folders are named after the *first* segment
//! below the output root only, so every document of a top-level category
//! shares one `_grounding` / `_chunks` pair however deeply it is nested.
//! Documents uploaded directly into the input root use a flat fallback
//! (`output/<stem>_grounding.json`, `output/chunks/`).

use crate::error::SkipReason;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A configured key prefix such as `input/` or `output/`.
///
/// Normalised on construction: empty segments are dropped (no leading or
/// doubled slashes) and a non-empty prefix always ends in exactly one `/`.
/// The empty prefix addresses the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prefix(String);

impl Prefix {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let segments: Vec<&str> = raw.as_ref().split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            Prefix(String::new())
        } else {
            Prefix(format!("{}/", segments.join("/")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty prefix (store root).
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The prefix without its trailing separator (`output/` → `output`).
    pub fn trimmed(&self) -> &str {
        self.0.trim_end_matches('/')
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Prefix {
    fn from(s: &str) -> Self {
        Prefix::new(s)
    }
}

/// Where a document sits below the input prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIdentity {
    /// Folder segments between the input prefix and the file name.
    pub subfolder: Vec<String>,
    /// File name without its final extension.
    pub stem: String,
    /// Final extension including the dot (`.pdf`), or empty.
    pub extension: String,
}

impl DocumentIdentity {
    /// Original file name (`stem + extension`).
    pub fn filename(&self) -> String {
        format!("{}{}", self.stem, self.extension)
    }

    /// Path relative to the input prefix, reassembled from the parts.
    pub fn relative_path(&self) -> String {
        if self.subfolder.is_empty() {
            self.filename()
        } else {
            format!("{}/{}", self.subfolder.join("/"), self.filename())
        }
    }
}

/// Split a file name at its last dot, ignoring a leading dot.
///
/// `report.pdf` → (`report`, `.pdf`), `a.tar.gz` → (`a.tar`, `.gz`),
/// `.env` → (`.env`, ``), `README` → (`README`, ``).
pub fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    }
}

/// Split an input key at the input prefix, or say why it is not a document.
pub fn classify_key(
    input_key: &str,
    input_folder: &Prefix,
) -> Result<DocumentIdentity, SkipReason> {
    if input_key.ends_with('/') {
        return Err(SkipReason::DirectoryPlaceholder);
    }
    let relative = input_key
        .strip_prefix(input_folder.as_str())
        .ok_or(SkipReason::OutsideInputFolder)?;

    let mut segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let filename = match segments.pop() {
        Some(name) => name,
        None => return Err(SkipReason::EmptyFilename),
    };
    let (stem, extension) = split_extension(filename);

    Ok(DocumentIdentity {
        subfolder: segments.into_iter().map(str::to_string).collect(),
        stem: stem.to_string(),
        extension: extension.to_string(),
    })
}

/// Non-failing variant of [`classify_key`].
pub fn document_identity(input_key: &str, input_folder: &Prefix) -> Option<DocumentIdentity> {
    classify_key(input_key, input_folder).ok()
}

/// Every output location for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputKeySet {
    pub identity: DocumentIdentity,
    /// `output/<subfolder>/<stem>.md`
    pub markdown_key: String,
    /// `output/<first>_grounding` (no trailing slash)
    pub grounding_folder: String,
    /// `output/<first>_grounding/<deeper>/<stem>_grounding.json`
    pub grounding_key: String,
    /// `output/<first>_chunks/`
    pub chunks_folder: String,
    /// `output/<first>_chunk_images/`
    pub chunk_images_folder: String,
}

/// Derive every output key for `input_key`.
///
/// Returns `None` for keys that are not documents under `input_folder`
/// (see [`classify_key`] for the reason).
pub fn derive_output_keys(
    input_key: &str,
    input_folder: &Prefix,
    output_folder: &Prefix,
) -> Option<OutputKeySet> {
    document_identity(input_key, input_folder)
        .map(|identity| OutputKeySet::for_identity(identity, output_folder))
}

impl OutputKeySet {
    pub fn for_identity(identity: DocumentIdentity, output_folder: &Prefix) -> Self {
        let out = output_folder.as_str();
        let stem = identity.stem.as_str();

        match identity.subfolder.split_first() {
            Some((first, deeper)) => {
                let markdown_key = format!("{out}{}/{stem}.md", identity.subfolder.join("/"));
                let base_folder = format!("{out}{first}");
                let relative_stem_path = if deeper.is_empty() {
                    stem.to_string()
                } else {
                    format!("{}/{stem}", deeper.join("/"))
                };
                let grounding_folder = format!("{base_folder}_grounding");
                let grounding_key =
                    format!("{grounding_folder}/{relative_stem_path}_grounding.json");
                Self {
                    markdown_key,
                    grounding_key,
                    grounding_folder,
                    chunks_folder: format!("{base_folder}_chunks/"),
                    chunk_images_folder: format!("{base_folder}_chunk_images/"),
                    identity,
                }
            }
            None => Self {
                markdown_key: format!("{out}{stem}.md"),
                grounding_folder: output_folder.trimmed().to_string(),
                grounding_key: format!("{out}{stem}_grounding.json"),
                chunks_folder: format!("{out}chunks/"),
                chunk_images_folder: format!("{out}chunk_images/"),
                identity,
            },
        }
    }

    /// Knowledge-base record for one chunk.
    pub fn chunk_key(&self, chunk_id: &str) -> String {
        format!(
            "{}{}_{}.json",
            self.chunks_folder, self.identity.stem, chunk_id
        )
    }

    /// Cropped image of one chunk.
    pub fn chunk_image_key(&self, chunk_id: &str) -> String {
        format!(
            "{}{}_{}.png",
            self.chunk_images_folder, self.identity.stem, chunk_id
        )
    }

    /// Full page with one chunk highlighted.
    pub fn annotation_key(&self, page: u32, chunk_id: &str) -> String {
        format!(
            "{}{}_p{}_{}_annotated.png",
            self.chunk_images_folder,
            self.identity.stem,
            page,
            clean_chunk_id(chunk_id)
        )
    }
}

/// Strip anchor markup that sometimes leaks into chunk ids
/// (`<a id="abc"></a>` → `abc`).
pub fn clean_chunk_id(raw: &str) -> String {
    raw.replace("<a id=", "")
        .replace("></a>", "")
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}
