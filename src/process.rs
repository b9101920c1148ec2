//! Document processing: one uploaded object in, its output family out.
//!
//! ## Steps per document
//!
//! ```text
//! key ─▶ classify ─▶ exists(markdown)? ─▶ get ─▶ parse ─▶ put markdown
//!                                                           │
//!                       put grounding + per-chunk JSON ◀────┤
//!                       crop located chunks (optional) ◀────┘
//! ```
//!
//! The markdown write is the commit point. Anything that fails before it
//! marks the document `failed`; anything after it is recorded as a warning
//! on an otherwise successful outcome, because the primary artifact landed
//! and a redelivered event would be skipped as already processed.
//!
//! ## Why per-document isolation?
//!
//! A notification can carry several uploads. One corrupt file or one parser
//! timeout must not cost the others their results, so every document ends in
//! a [`DocumentOutcome`] and batches never return early.

use crate::config::PipelineConfig;
use crate::crop::{ChunkImageRequest, CropOutcome, ImageCropper};
use crate::error::{IngestError, SkipReason};
use crate::event::S3Event;
use crate::grounding::{build_grounding_record, chunk_documents, GroundingRecord};
use crate::keys::{classify_key, OutputKeySet};
use crate::output::{BatchReport, DocumentOutcome};
use crate::pipeline::parser::DocumentParser;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::store::{content_type, ObjectStore};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const NO_RENDERER_WARNING: &str = "Chunk images requested but no page renderer is available";

pub struct DocumentPipeline {
    store: Arc<dyn ObjectStore>,
    parser: Arc<dyn DocumentParser>,
    config: PipelineConfig,
    cropper: Option<ImageCropper>,
    progress: ProgressCallback,
}

impl DocumentPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        parser: Arc<dyn DocumentParser>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            parser,
            config,
            cropper: None,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Attach the cropper used when `config.chunk_images` is set.
    pub fn with_cropper(mut self, cropper: ImageCropper) -> Self {
        self.cropper = Some(cropper);
        self
    }

    /// Replace the default no-op progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = callback;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Process a single input key. Never returns an error: failures are
    /// reported in the outcome.
    pub async fn process_key(&self, key: &str) -> DocumentOutcome {
        let source = self.store.location(key);

        let keys = match classify_key(key, &self.config.input_folder) {
            Ok(identity) => OutputKeySet::for_identity(identity, &self.config.output_folder),
            Err(reason) => {
                info!("Skipping {}: {}", key, reason);
                return DocumentOutcome::skipped(source, None, reason);
            }
        };
        let output = self.store.location(&keys.markdown_key);

        if !self.config.force_reprocess {
            match self.store.exists(&keys.markdown_key).await {
                Ok(true) => {
                    info!(
                        "Skipping {}: already processed ({})",
                        key, keys.markdown_key
                    );
                    return DocumentOutcome::skipped(
                        source,
                        Some(output),
                        SkipReason::AlreadyProcessed,
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Error processing {}: {}", key, e);
                    return DocumentOutcome::failed(source, None, e);
                }
            }
        }

        let start = Instant::now();
        match self.ingest(key, &keys, source.clone(), output).await {
            Ok(outcome) => {
                info!(
                    "Completed pipeline for {} → {} in {}ms",
                    key,
                    keys.markdown_key,
                    start.elapsed().as_millis()
                );
                outcome
            }
            Err(e) => {
                warn!("Error processing {}: {}", key, e);
                DocumentOutcome::failed(source, None, e)
            }
        }
    }

    /// Process many keys with bounded concurrency. Results keep input order.
    pub async fn process_keys<I, S>(&self, keys: I) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        self.progress.on_batch_start(keys.len());

        let mut indexed: Vec<(usize, DocumentOutcome)> = stream::iter(keys.iter().enumerate())
            .map(|(idx, key)| async move {
                self.progress.on_document_start(key);
                let outcome = self.process_key(key).await;
                self.progress.on_document_complete(&outcome);
                (idx, outcome)
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);

        let report = BatchReport::new(indexed.into_iter().map(|(_, o)| o).collect());
        info!(
            "All records processed: {} succeeded, {} skipped, {} failed",
            report.succeeded(),
            report.skipped(),
            report.failed()
        );
        self.progress
            .on_batch_complete(report.succeeded(), report.skipped(), report.failed());
        report
    }

    /// React to an S3 notification.
    ///
    /// The store is bound to one bucket, so record bucket names are only
    /// logged; callers serving several buckets group records first.
    pub async fn handle_event(&self, event: &S3Event) -> BatchReport {
        let objects = event.objects();
        info!("Received {} event record(s)", objects.len());
        for w in self.ensure_folders().await {
            warn!("{}", w);
        }
        for obj in &objects {
            debug!("Record: bucket={} key={}", obj.bucket, obj.key);
        }
        let keys = objects.iter().map(|o| o.key.as_str());
        self.process_keys(keys).await
    }

    /// Create zero-byte placeholders for the input and output prefixes when
    /// they are missing. Returns the problems encountered; never fails.
    pub async fn ensure_folders(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for prefix in [&self.config.input_folder, &self.config.output_folder] {
            if prefix.is_root() {
                continue;
            }
            let key = prefix.as_str();
            let result = match self.store.exists(key).await {
                Ok(true) => Ok(()),
                Ok(false) => self
                    .store
                    .put(key, Vec::new(), content_type::DIRECTORY)
                    .await
                    .map(|_| debug!("Ensured folder exists: {}", self.store.location(key))),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warnings.push(format!("Could not ensure folder {key}: {e}"));
            }
        }
        warnings
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn wants_images(&self) -> bool {
        self.config.chunk_images && self.cropper.as_ref().is_some_and(|c| c.has_renderer())
    }

    async fn ingest(
        &self,
        key: &str,
        keys: &OutputKeySet,
        source: String,
        output: String,
    ) -> Result<DocumentOutcome, IngestError> {
        info!("Fetching {}", source);
        let mut bytes = self.store.get(key).await?;

        let filename = keys.identity.filename();
        let document = if self.wants_images() {
            bytes.clone()
        } else {
            std::mem::take(&mut bytes)
        };
        info!(
            "Starting ADE parsing for {} (model={})",
            filename, self.config.model
        );
        let response = self
            .parser
            .parse(document, &filename, &self.config.model)
            .await?;

        self.store
            .put(
                &keys.markdown_key,
                response.markdown.clone().into_bytes(),
                content_type::MARKDOWN,
            )
            .await?;
        info!("Uploaded markdown → {}", output);

        let mut outcome = DocumentOutcome::success(source, output);
        let record = build_grounding_record(&response);

        if record.chunks.is_empty() {
            info!(
                "No chunks in response for {}; grounding not written",
                filename
            );
            return Ok(outcome);
        }

        self.write_grounding(keys, &record, &mut outcome).await;

        if self.config.chunk_images {
            if self.wants_images() {
                self.write_chunk_images(key, &bytes, keys, &record, &mut outcome)
                    .await;
            } else {
                outcome.warnings.push(NO_RENDERER_WARNING.into());
            }
        }

        Ok(outcome)
    }

    async fn write_grounding(
        &self,
        keys: &OutputKeySet,
        record: &GroundingRecord,
        outcome: &mut DocumentOutcome,
    ) {
        let grounding = serde_json::to_vec_pretty(record)
            .map_err(|e| IngestError::Internal(e.to_string()));
        let written = match grounding {
            Ok(body) => {
                self.store
                    .put(&keys.grounding_key, body, content_type::JSON)
                    .await
            }
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => info!(
                "Saved grounding data ({} chunks) → {}",
                record.chunks.len(),
                keys.grounding_key
            ),
            Err(e) => {
                warn!(
                    "Could not save grounding data {}: {}",
                    keys.grounding_key, e
                );
                outcome
                    .warnings
                    .push(format!("Could not save grounding data: {e}"));
            }
        }

        for doc in chunk_documents(record, &keys.identity.stem) {
            let chunk_key = keys.chunk_key(&doc.chunk_id);
            let result = match serde_json::to_vec_pretty(&doc) {
                Ok(body) => self.store.put(&chunk_key, body, content_type::JSON).await,
                Err(e) => Err(IngestError::Internal(e.to_string())),
            };
            match result {
                Ok(()) => outcome.chunk_files += 1,
                Err(e) => {
                    warn!("Could not save chunk file {}: {}", chunk_key, e);
                    outcome
                        .warnings
                        .push(format!("Could not save chunk {}: {e}", doc.chunk_id));
                }
            }
        }
        info!(
            "Created {} chunk files in {}",
            outcome.chunk_files, keys.chunks_folder
        );
    }

    async fn write_chunk_images(
        &self,
        key: &str,
        bytes: &[u8],
        keys: &OutputKeySet,
        record: &GroundingRecord,
        outcome: &mut DocumentOutcome,
    ) {
        let Some(cropper) = &self.cropper else {
            return;
        };
        let requests: Vec<ChunkImageRequest> = record
            .chunks
            .iter()
            .filter(|c| c.located())
            .filter_map(|c| {
                c.grounding.map(|g| ChunkImageRequest {
                    source_key: key.to_string(),
                    output_key: keys.chunk_image_key(&c.id),
                    page: g.page,
                    bbox: Some(g.bbox.to_array().to_vec()),
                    force: self.config.force_reprocess,
                })
            })
            .collect();
        if requests.is_empty() {
            return;
        }

        let results = cropper.crop_from_bytes(bytes, &requests).await;
        for (req, result) in requests.iter().zip(results) {
            match result {
                Ok(CropOutcome::Written { .. }) | Ok(CropOutcome::Existing { .. }) => {
                    outcome.chunk_images += 1
                }
                Ok(CropOutcome::Unsupported) => {}
                Err(e) => {
                    warn!("Could not crop {}: {}", req.output_key, e);
                    outcome
                        .warnings
                        .push(format!("Could not crop {}: {e}", req.output_key));
                }
            }
        }
        info!(
            "Stored {} chunk images in {}",
            outcome.chunk_images, keys.chunk_images_folder
        );
    }
}
