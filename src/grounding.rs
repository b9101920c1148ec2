//! Grounding extraction: parser response → canonical storage records.
//!
//! The parse API does not guarantee a field-complete response. Chunks may come
//! back without a location, splits without a class, metadata may be missing
//! entirely. [`ParseResponse`] therefore models every upstream field as
//! optional, and [`build_grounding_record`] fills each gap with a fixed
//! default (empty string, zero, empty list) instead of failing.
//!
//! The output side ([`GroundingRecord`], [`ChunkDocument`]) is the contract
//! with downstream indexing: key names are stable and every field is always
//! present except a chunk's `grounding`, which is omitted when the parser did
//! not locate the chunk.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

// ── Upstream response ────────────────────────────────────────────────────

/// Body returned by the parse endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub markdown: String,
    pub chunks: Option<Vec<RawChunk>>,
    pub splits: Option<Vec<RawSplit>>,
    pub metadata: Option<RawMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawChunk {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub chunk_type: Option<String>,
    pub markdown: Option<String>,
    pub grounding: Option<RawGrounding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawGrounding {
    pub page: Option<u32>,
    #[serde(rename = "box")]
    pub bbox: Option<RawBox>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBox {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSplit {
    pub chunks: Option<Vec<String>>,
    pub pages: Option<Vec<u32>>,
    pub markdown: Option<String>,
    #[serde(alias = "class_")]
    pub class: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMetadata {
    pub filename: Option<String>,
    pub page_count: Option<u32>,
    pub version: Option<String>,
    pub job_id: Option<String>,
    pub org_id: Option<String>,
    pub credit_usage: Option<f64>,
    pub duration_ms: Option<u64>,
}

/// `null` deserializes like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Canonical record ─────────────────────────────────────────────────────

/// Everything the parser told us about where content sits in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingRecord {
    pub chunks: Vec<ChunkRecord>,
    pub splits: Vec<SplitRecord>,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub chunk_type: String,
    pub markdown: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub grounding: Option<ChunkGrounding>,
}

impl ChunkRecord {
    /// True when the chunk can be cropped: it has an id and a location.
    pub fn located(&self) -> bool {
        !self.id.is_empty() && self.grounding.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkGrounding {
    /// 0-based page index.
    pub page: u32,
    #[serde(rename = "box")]
    pub bbox: BoxRecord,
}

/// A box as stored: named sides, no validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoxRecord {
    pub fn to_array(&self) -> [f64; 4] {
        [self.left, self.top, self.right, self.bottom]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRecord {
    pub chunks: Vec<String>,
    pub pages: Vec<u32>,
    pub markdown: String,
    #[serde(rename = "class_")]
    pub class: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    pub page_count: u32,
    pub version: String,
    pub job_id: String,
    pub org_id: String,
    pub credit_usage: f64,
    pub duration_ms: u64,
}

/// Per-chunk record written next to the grounding file for knowledge-base
/// ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDocument {
    pub chunk_id: String,
    pub chunk_type: String,
    pub text: String,
    /// `[left, top, right, bottom]`; the whole page when the chunk is unlocated.
    pub bbox: [f64; 4],
    pub page: u32,
    pub source_document: String,
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Build the canonical grounding record from a parse response.
pub fn build_grounding_record(response: &ParseResponse) -> GroundingRecord {
    let chunks = response
        .chunks
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(chunk_record)
        .collect();

    let splits = response
        .splits
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|s| SplitRecord {
            chunks: s.chunks.clone().unwrap_or_default(),
            pages: s.pages.clone().unwrap_or_default(),
            markdown: s.markdown.clone().unwrap_or_default(),
            class: s.class.clone().unwrap_or_default(),
        })
        .collect();

    let metadata = response
        .metadata
        .as_ref()
        .map(|m| DocumentMetadata {
            filename: m.filename.clone().unwrap_or_default(),
            page_count: m.page_count.unwrap_or(0),
            version: m.version.clone().unwrap_or_default(),
            job_id: m.job_id.clone().unwrap_or_default(),
            org_id: m.org_id.clone().unwrap_or_default(),
            credit_usage: m.credit_usage.unwrap_or(0.0),
            duration_ms: m.duration_ms.unwrap_or(0),
        })
        .unwrap_or_default();

    GroundingRecord {
        chunks,
        splits,
        metadata,
    }
}

fn chunk_record(raw: &RawChunk) -> ChunkRecord {
    let markdown = raw.markdown.clone().unwrap_or_default();
    let id = raw
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| extract_chunk_id_from_markdown(&markdown))
        .unwrap_or_default();

    // Location only counts when both halves are present.
    let grounding = raw.grounding.as_ref().and_then(|g| match (g.page, &g.bbox) {
        (Some(page), Some(b)) => Some(ChunkGrounding {
            page,
            bbox: BoxRecord {
                left: b.left.unwrap_or(0.0),
                top: b.top.unwrap_or(0.0),
                right: b.right.unwrap_or(0.0),
                bottom: b.bottom.unwrap_or(0.0),
            },
        }),
        _ => None,
    });

    ChunkRecord {
        id,
        chunk_type: raw.chunk_type.clone().unwrap_or_default(),
        markdown,
        grounding,
    }
}

/// One knowledge-base record per chunk that has an id.
pub fn chunk_documents(record: &GroundingRecord, source_document: &str) -> Vec<ChunkDocument> {
    record
        .chunks
        .iter()
        .filter(|c| !c.id.is_empty())
        .map(|c| ChunkDocument {
            chunk_id: c.id.clone(),
            chunk_type: if c.chunk_type.is_empty() {
                "text".to_string()
            } else {
                c.chunk_type.clone()
            },
            text: c.markdown.clone(),
            bbox: c
                .grounding
                .map(|g| g.bbox.to_array())
                .unwrap_or([0.0, 0.0, 1.0, 1.0]),
            page: c.grounding.map(|g| g.page).unwrap_or(0),
            source_document: source_document.to_string(),
        })
        .collect()
}

static RE_CHUNK_ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<a id=["']([^"']*)["']></a>"#).unwrap());

/// Find the first `<a id="…"></a>` anchor in chunk markdown.
pub fn extract_chunk_id_from_markdown(markdown: &str) -> Option<String> {
    RE_CHUNK_ANCHOR
        .captures(markdown)
        .map(|caps| caps[1].to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ParseResponse {
        serde_json::from_value(value).expect("response should deserialize")
    }

    #[test]
    fn null_markdown_is_empty() {
        let response = parse(json!({"markdown": null, "chunks": null}));
        assert_eq!(response.markdown, "");
        assert!(build_grounding_record(&response).chunks.is_empty());

        let response = parse(json!({}));
        assert_eq!(response.markdown, "");
    }

    #[test]
    fn full_response() {
        let response = parse(json!({
            "markdown": "# Title",
            "chunks": [{
                "id": "c1",
                "type": "text",
                "markdown": "<a id='c1'></a>\n# Title",
                "grounding": {"page": 0, "box": {"left": 0.1, "top": 0.2, "right": 0.9, "bottom": 0.3}}
            }],
            "splits": [{"class": "page", "identifier": "page_0", "pages": [0], "markdown": "# Title", "chunks": ["c1"]}],
            "metadata": {"filename": "a.pdf", "page_count": 1, "credit_usage": 3.0, "duration_ms": 1200, "job_id": "j", "org_id": "o", "version": "dpt-2"}
        }));
        let record = build_grounding_record(&response);
        assert_eq!(record.chunks.len(), 1);
        let g = record.chunks[0].grounding.expect("located");
        assert_eq!(g.page, 0);
        assert_eq!(g.bbox.to_array(), [0.1, 0.2, 0.9, 0.3]);
        assert_eq!(record.splits[0].class, "page");
        assert_eq!(record.splits[0].chunks, vec!["c1"]);
        assert_eq!(record.metadata.page_count, 1);
        assert_eq!(record.metadata.duration_ms, 1200);
    }

    #[test]
    fn empty_response_yields_defaults() {
        let record = build_grounding_record(&parse(json!({})));
        assert!(record.chunks.is_empty());
        assert!(record.splits.is_empty());
        assert_eq!(record.metadata, DocumentMetadata::default());
    }

    #[test]
    fn chunk_without_box_keeps_no_grounding() {
        let record = build_grounding_record(&parse(json!({
            "chunks": [
                {"id": "a", "type": "table", "markdown": "|x|", "grounding": {"page": 1}},
                {"id": "b", "markdown": "plain"}
            ]
        })));
        assert_eq!(record.chunks.len(), 2);
        assert!(record.chunks.iter().all(|c| c.grounding.is_none()));
        assert!(record.chunks.iter().all(|c| !c.located()));
        assert_eq!(record.chunks[1].chunk_type, "");
    }

    #[test]
    fn partial_box_defaults_to_zero() {
        let record = build_grounding_record(&parse(json!({
            "chunks": [{"id": "a", "grounding": {"page": 2, "box": {"right": 0.5}}}]
        })));
        let g = record.chunks[0].grounding.unwrap();
        assert_eq!(g.bbox.to_array(), [0.0, 0.0, 0.5, 0.0]);
        assert!(record.chunks[0].located());
    }

    #[test]
    fn missing_id_falls_back_to_anchor() {
        let record = build_grounding_record(&parse(json!({
            "chunks": [{"markdown": "<a id=\"anchor-7\"></a>\nBody"}]
        })));
        assert_eq!(record.chunks[0].id, "anchor-7");
    }

    #[test]
    fn serialized_keys_are_stable() {
        let record = build_grounding_record(&parse(json!({
            "chunks": [
                {"id": "a", "type": "text", "markdown": "x", "grounding": {"page": 0, "box": {"left": 0, "top": 0, "right": 1, "bottom": 1}}},
                {"id": "b", "type": "text", "markdown": "y"}
            ],
            "splits": [{"class": "page"}]
        })));
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["chunks"][0]["grounding"]["box"]["left"].is_number());
        assert!(value["chunks"][0]["type"].is_string());
        assert!(value["chunks"][1].get("grounding").is_none());
        assert_eq!(value["splits"][0]["class_"], "page");
        assert!(value["metadata"]["page_count"].is_number());
    }

    #[test]
    fn chunk_documents_apply_defaults() {
        let record = build_grounding_record(&parse(json!({
            "chunks": [
                {"id": "a", "type": "figure", "markdown": "fig", "grounding": {"page": 3, "box": {"left": 0.1, "top": 0.1, "right": 0.2, "bottom": 0.2}}},
                {"id": "b", "markdown": "loose"},
                {"markdown": "no id at all"}
            ]
        })));
        let docs = chunk_documents(&record, "report");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].page, 3);
        assert_eq!(docs[0].chunk_type, "figure");
        assert_eq!(docs[0].source_document, "report");
        assert_eq!(docs[1].chunk_type, "text");
        assert_eq!(docs[1].bbox, [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(docs[1].page, 0);
    }

    #[test]
    fn anchor_extraction() {
        assert_eq!(
            extract_chunk_id_from_markdown("text <a id='x-1'></a> more"),
            Some("x-1".to_string())
        );
        assert_eq!(extract_chunk_id_from_markdown("no anchor"), None);
    }
}
