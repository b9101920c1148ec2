//! Document parsing via LandingAI ADE (Agentic Document Extraction).
//!
//! The parser is the only stage that leaves the process: the raw document is
//! posted as multipart form data and the service answers with markdown plus
//! chunk locations. [`DocumentParser`] keeps the pipeline independent of the
//! HTTP details so tests can substitute a scripted parser.
//!
//! No retries happen here. A failed call fails the document; the caller's
//! notification source decides whether to redeliver.

use crate::error::IngestError;
use crate::grounding::ParseResponse;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{debug, info};

/// Production endpoint of the ADE parse API.
pub const DEFAULT_ENDPOINT: &str = "https://api.va.landing.ai/v1/ade/parse";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "dpt-2-latest";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "VISION_AGENT_API_KEY";

/// Turns raw document bytes into a [`ParseResponse`].
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        model: &str,
    ) -> Result<ParseResponse, IngestError>;
}

/// HTTP client for the ADE parse endpoint.
#[derive(Debug, Clone)]
pub struct AdeClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout_secs: u64,
}

impl AdeClient {
    /// Default request timeout. Large scanned documents routinely take
    /// several minutes.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

    pub fn new(api_key: impl Into<String>) -> Result<Self, IngestError> {
        Self::with_options(api_key, DEFAULT_ENDPOINT, Self::DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_options(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, IngestError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(IngestError::InvalidConfig(format!(
                "ADE API key is empty (set {API_KEY_ENV})"
            )));
        }
        if timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(
                "parse timeout must be at least 1 second".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| IngestError::ParserRequest {
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            api_key,
            endpoint: endpoint.into(),
            timeout_secs,
        })
    }

    /// Read the key from `VISION_AGENT_API_KEY`.
    pub fn from_env() -> Result<Self, IngestError> {
        let key = std::env::var(API_KEY_ENV).map_err(|_| {
            IngestError::InvalidConfig(format!("{API_KEY_ENV} is not set"))
        })?;
        Self::new(key)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DocumentParser for AdeClient {
    async fn parse(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        model: &str,
    ) -> Result<ParseResponse, IngestError> {
        info!(
            "Sending {} ({} bytes) to ADE (model={})",
            filename,
            bytes.len(),
            model
        );

        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(crate::store::content_type_for(filename))
            .map_err(|e| IngestError::ParserRequest {
                reason: e.to_string(),
            })?;
        let form = Form::new()
            .part("document", part)
            .text("model", model.to_string());

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IngestError::ParserTimeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    IngestError::ParserRequest {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::ParserStatus {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                IngestError::ParserTimeout {
                    secs: self.timeout_secs,
                }
            } else {
                IngestError::ParserRequest {
                    reason: e.to_string(),
                }
            }
        })?;
        let parsed = decode_response(&body)?;
        debug!(
            "ADE returned {} chars of markdown, {} chunks",
            parsed.markdown.len(),
            parsed.chunks.as_ref().map_or(0, Vec::len)
        );
        Ok(parsed)
    }
}

/// Decode a parse response body.
pub fn decode_response(body: &[u8]) -> Result<ParseResponse, IngestError> {
    serde_json::from_slice(body).map_err(|e| IngestError::ParserResponse {
        reason: e.to_string(),
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
