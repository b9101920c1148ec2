//! Decoding of S3 `ObjectCreated` notification payloads.
//!
//! S3 delivers object keys form-encoded: spaces arrive as `+` and reserved
//! bytes as `%XX`. [`S3Event::objects`] undoes that so the pipeline sees the
//! key exactly as it was uploaded.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "eventName", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntity {
    pub key: String,
}

/// A decoded `(bucket, key)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl S3Event {
    pub fn from_json(payload: &str) -> Result<Self, IngestError> {
        serde_json::from_str(payload).map_err(|e| IngestError::InvalidEvent(e.to_string()))
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(payload).map_err(|e| IngestError::InvalidEvent(e.to_string()))
    }

    /// Every record's bucket and URL-decoded key, in delivery order.
    pub fn objects(&self) -> Vec<ObjectRef> {
        self.records
            .iter()
            .map(|r| ObjectRef {
                bucket: r.s3.bucket.name.clone(),
                key: unquote_plus(&r.s3.object.key),
            })
            .collect()
    }
}

/// Form-decode a key: `+` → space, `%XX` → byte.
///
/// Malformed escapes are kept literally. Decoded bytes that are not valid
/// UTF-8 are replaced with U+FFFD.
pub fn unquote_plus(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
