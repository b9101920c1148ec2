//! Amazon S3 backend.

use super::ObjectStore;
use crate::error::IngestError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the standard AWS environment (credentials chain,
    /// `AWS_REGION`, profiles).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn store_error(key: &str, e: impl std::error::Error) -> IngestError {
        IngestError::Store {
            key: key.to_string(),
            reason: DisplayErrorContext(&e).to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, IngestError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    IngestError::ObjectNotFound {
                        key: key.to_string(),
                    }
                } else {
                    Self::store_error(key, e)
                }
            })?;
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| Self::store_error(key, e))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), IngestError> {
        let len = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| Self::store_error(key, e))?;
        debug!("Uploaded s3://{}/{} ({} bytes)", self.bucket, key, len);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, IngestError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(Self::store_error(key, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, IngestError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| Self::store_error(prefix, e))?;
            let page_keys = page.contents().iter().filter_map(|o| o.key());
            keys.extend(page_keys.map(str::to_string));
        }
        keys.sort();
        Ok(keys)
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}
