//! Integration tests for the document pipeline and cropper.
//!
//! Everything runs in-process: a [`MemoryObjectStore`] stands in for the
//! bucket, a scripted parser returns canned ADE responses, and a renderer
//! produces solid white pages of a fixed size.

use ade_ingest::grounding::ParseResponse;
use ade_ingest::{
    AnnotationRequest, BatchProgressCallback, ChunkImageRequest, CropOptions, CropOutcome,
    DocumentOutcome, DocumentParser, DocumentPipeline, DocumentStatus, ImageCropper, IngestError,
    MemoryObjectStore, NormalizedBox, ObjectStore, PageRenderer, PipelineConfig, RenderedPage,
    S3Event, SkipReason,
};
use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Returns a canned response per filename; unknown filenames fail.
#[derive(Default)]
struct ScriptedParser {
    responses: HashMap<String, Value>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, String, usize)>>,
}

impl ScriptedParser {
    fn with(mut self, filename: &str, response: Value) -> Self {
        self.responses.insert(filename.to_string(), response);
        self
    }
}

#[async_trait]
impl DocumentParser for ScriptedParser {
    async fn parse(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        model: &str,
    ) -> Result<ParseResponse, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((filename.to_string(), model.to_string(), bytes.len()));
        match self.responses.get(filename) {
            Some(v) => Ok(serde_json::from_value(v.clone()).unwrap()),
            None => Err(IngestError::ParserStatus {
                status: 422,
                body: format!("cannot parse {filename}"),
            }),
        }
    }
}

/// Letter-sized pages rendered at 2 px per point.
struct WhitePages {
    renders: AtomicUsize,
}

impl WhitePages {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            renders: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PageRenderer for WhitePages {
    async fn render(
        &self,
        _bytes: &[u8],
        page_index: u32,
        _dpi: u32,
    ) -> Result<RenderedPage, IngestError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if page_index >= 3 {
            return Err(IngestError::Render {
                page: page_index as usize,
                detail: "page index out of range".into(),
            });
        }
        Ok(RenderedPage {
            image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                400,
                600,
                Rgba([255, 255, 255, 255]),
            )),
            width_points: 200.0,
            height_points: 300.0,
        })
    }
}

/// Delegates to a memory store, failing selected operations.
#[derive(Default)]
struct FlakyStore {
    inner: Arc<MemoryObjectStore>,
    fail_json_puts: bool,
    fail_exists: bool,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, IngestError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), IngestError> {
        if self.fail_json_puts && content_type == ade_ingest::store::content_type::JSON {
            return Err(IngestError::Store {
                key: key.to_string(),
                reason: "disk full".into(),
            });
        }
        self.inner.put(key, bytes, content_type).await
    }

    async fn exists(&self, key: &str) -> Result<bool, IngestError> {
        if self.fail_exists {
            return Err(IngestError::Store {
                key: key.to_string(),
                reason: "access denied".into(),
            });
        }
        self.inner.exists(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, IngestError> {
        self.inner.list(prefix).await
    }

    fn location(&self, key: &str) -> String {
        self.inner.location(key)
    }
}

/// Records every progress event as a string.
#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl BatchProgressCallback for EventLog {
    fn on_batch_start(&self, total: usize) {
        self.0.lock().unwrap().push(format!("start {total}"));
    }

    fn on_document_complete(&self, outcome: &DocumentOutcome) {
        self.0
            .lock()
            .unwrap()
            .push(format!("{:?} {}", outcome.status, outcome.source));
    }

    fn on_batch_complete(&self, succeeded: usize, skipped: usize, failed: usize) {
        self.0
            .lock()
            .unwrap()
            .push(format!("done {succeeded}/{skipped}/{failed}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn report_response() -> Value {
    json!({
        "markdown": "<a id='c1'></a>\n# Report\n\n<a id='c2'></a>\nBody text",
        "chunks": [
            {
                "id": "c1", "type": "text", "markdown": "<a id='c1'></a>\n# Report",
                "grounding": {"page": 0, "box": {"left": 0.1, "top": 0.1, "right": 0.9, "bottom": 0.2}}
            },
            {
                "id": "c2", "type": "table", "markdown": "|a|b|",
                "grounding": {"page": 1, "box": {"left": 0.0, "top": 0.5, "right": 1.0, "bottom": 0.75}}
            },
            {"type": "marginalia", "markdown": "<a id=\"c3\"></a>\nfooter"},
            {"type": "text", "markdown": "no id anywhere"}
        ],
        "splits": [{"class": "page", "pages": [0], "markdown": "# Report", "chunks": ["c1"]}],
        "metadata": {"filename": "report.pdf", "page_count": 2, "credit_usage": 3.0, "duration_ms": 900}
    })
}

fn config() -> PipelineConfig {
    PipelineConfig::builder().build().unwrap()
}

async fn seeded_store(keys: &[&str]) -> Arc<MemoryObjectStore> {
    let store = Arc::new(MemoryObjectStore::new());
    for key in keys {
        store.insert(*key, b"%PDF-1.7 fake".to_vec()).await;
    }
    store
}

fn parser_for(filename: &str, response: Value) -> Arc<ScriptedParser> {
    Arc::new(ScriptedParser::default().with(filename, response))
}

fn white_cropper(store: Arc<MemoryObjectStore>, renderer: Arc<WhitePages>) -> ImageCropper {
    ImageCropper::new(store, Some(renderer), CropOptions::default())
}

fn json_at(bytes: Result<Vec<u8>, IngestError>) -> Value {
    let bytes = bytes.expect("stored object");
    serde_json::from_slice(&bytes).expect("stored JSON")
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn processes_document_into_output_family() {
    let store = seeded_store(&["input/medical/report.pdf"]).await;
    let parser = parser_for("report.pdf", report_response());
    let pipeline = DocumentPipeline::new(store.clone(), parser.clone(), config());

    let outcome = pipeline.process_key("input/medical/report.pdf").await;

    assert_eq!(outcome.status, DocumentStatus::Success, "{outcome:?}");
    assert_eq!(outcome.source, "memory://input/medical/report.pdf");
    assert_eq!(
        outcome.output.as_deref(),
        Some("memory://output/medical/report.md")
    );
    assert_eq!(outcome.chunk_files, 3);
    assert!(outcome.warnings.is_empty());

    let md = store.object("output/medical/report.md").await.unwrap();
    assert_eq!(md.content_type, "text/markdown");
    assert!(String::from_utf8(md.bytes).unwrap().contains("# Report"));

    let grounding = json_at(
        store
            .get("output/medical_grounding/report_grounding.json")
            .await,
    );
    assert_eq!(grounding["chunks"].as_array().unwrap().len(), 4);
    assert_eq!(grounding["chunks"][1]["grounding"]["page"], 1);
    assert!(grounding["chunks"][2].get("grounding").is_none());
    assert_eq!(grounding["chunks"][2]["id"], "c3");
    assert_eq!(grounding["splits"][0]["class_"], "page");
    assert_eq!(grounding["metadata"]["page_count"], 2);

    let chunk = json_at(store.get("output/medical_chunks/report_c2.json").await);
    assert_eq!(chunk["chunk_id"], "c2");
    assert_eq!(chunk["chunk_type"], "table");
    assert_eq!(chunk["page"], 1);
    assert_eq!(chunk["bbox"], json!([0.0, 0.5, 1.0, 0.75]));
    assert_eq!(chunk["source_document"], "report");

    let unlocated = json_at(store.get("output/medical_chunks/report_c3.json").await);
    assert_eq!(unlocated["bbox"], json!([0.0, 0.0, 1.0, 1.0]));
    assert_eq!(unlocated["page"], 0);

    let seen = parser.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![("report.pdf".to_string(), "dpt-2-latest".to_string(), 13)]
    );
}

#[tokio::test]
async fn already_processed_is_skipped_unless_forced() {
    let store = seeded_store(&["input/medical/report.pdf"]).await;
    store
        .insert("output/medical/report.md", b"old".to_vec())
        .await;
    let parser = parser_for("report.pdf", report_response());

    let pipeline = DocumentPipeline::new(store.clone(), parser.clone(), config());
    let outcome = pipeline.process_key("input/medical/report.pdf").await;
    assert_eq!(outcome.status, DocumentStatus::Skipped);
    assert_eq!(outcome.reason, Some(SkipReason::AlreadyProcessed));
    assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.get("output/medical/report.md").await.unwrap(), b"old");

    let forced = PipelineConfig::builder()
        .force_reprocess(true)
        .build()
        .unwrap();
    let pipeline = DocumentPipeline::new(store.clone(), parser.clone(), forced);
    let outcome = pipeline.process_key("input/medical/report.pdf").await;
    assert_eq!(outcome.status, DocumentStatus::Success);
    assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
    assert_ne!(store.get("output/medical/report.md").await.unwrap(), b"old");
}

#[tokio::test]
async fn zero_chunks_writes_markdown_only() {
    let store = seeded_store(&["input/readme.txt"]).await;
    let parser = parser_for("readme.txt", json!({"markdown": "hello", "chunks": []}));
    let pipeline = DocumentPipeline::new(store.clone(), parser, config());

    let outcome = pipeline.process_key("input/readme.txt").await;
    assert_eq!(outcome.status, DocumentStatus::Success);
    assert_eq!(outcome.chunk_files, 0);
    assert_eq!(store.get("output/readme.md").await.unwrap(), b"hello");
    assert!(!store.exists("output/readme_grounding.json").await.unwrap());
    assert!(store.list("output/chunks/").await.unwrap().is_empty());
}

#[tokio::test]
async fn grounding_write_failures_become_warnings() {
    let inner = seeded_store(&["input/medical/report.pdf"]).await;
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        fail_json_puts: true,
        ..FlakyStore::default()
    });
    let parser = parser_for("report.pdf", report_response());
    let pipeline = DocumentPipeline::new(store.clone(), parser, config());

    let outcome = pipeline.process_key("input/medical/report.pdf").await;

    assert_eq!(outcome.status, DocumentStatus::Success, "{outcome:?}");
    assert_eq!(outcome.chunk_files, 0);
    // One for the grounding file, one per identified chunk.
    assert_eq!(outcome.warnings.len(), 4, "{:?}", outcome.warnings);
    assert!(outcome.warnings[0].contains("disk full"));
    assert!(inner.exists("output/medical/report.md").await.unwrap());
    assert!(!inner
        .exists("output/medical_grounding/report_grounding.json")
        .await
        .unwrap());
}

#[tokio::test]
async fn existence_check_failure_fails_document() {
    let inner = seeded_store(&["input/medical/report.pdf"]).await;
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        fail_exists: true,
        ..FlakyStore::default()
    });
    let parser = parser_for("report.pdf", report_response());
    let pipeline = DocumentPipeline::new(store.clone(), parser.clone(), config());

    let outcome = pipeline.process_key("input/medical/report.pdf").await;

    assert_eq!(outcome.status, DocumentStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("access denied"));
    assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
    assert!(!inner.exists("output/medical/report.md").await.unwrap());
}

#[tokio::test]
async fn flat_document_uses_flat_layout() {
    let store = seeded_store(&["input/report.pdf"]).await;
    let parser = parser_for("report.pdf", report_response());
    let pipeline = DocumentPipeline::new(store.clone(), parser, config());

    let outcome = pipeline.process_key("input/report.pdf").await;
    assert_eq!(outcome.status, DocumentStatus::Success);
    assert!(store.exists("output/report.md").await.unwrap());
    assert!(store.exists("output/report_grounding.json").await.unwrap());
    assert!(store.exists("output/chunks/report_c1.json").await.unwrap());
}

#[tokio::test]
async fn skip_conditions_are_reported() {
    let store = seeded_store(&[]).await;
    let parser = Arc::new(ScriptedParser::default());
    let pipeline = DocumentPipeline::new(store, parser.clone(), config());

    let report = pipeline
        .process_keys(["input/medical/", "other/x.pdf", "input/"])
        .await;
    let reasons: Vec<_> = report.results.iter().map(|r| r.reason).collect();
    assert_eq!(
        reasons,
        vec![
            Some(SkipReason::DirectoryPlaceholder),
            Some(SkipReason::OutsideInputFolder),
            Some(SkipReason::DirectoryPlaceholder),
        ]
    );
    assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn batch_isolates_failures_and_keeps_order() {
    let seeded = ["input/a/one.pdf", "input/a/bad.pdf", "input/b/two.pdf"];
    let store = seeded_store(&seeded).await;
    store.insert("output/b/two.md", b"done".to_vec()).await;
    let parser = Arc::new(
        ScriptedParser::default()
            .with("one.pdf", json!({"markdown": "one"}))
            .with("two.pdf", json!({"markdown": "two"})),
    );
    let config = PipelineConfig::builder().concurrency(3).build().unwrap();
    let pipeline = DocumentPipeline::new(store.clone(), parser, config);

    let keys = [
        "input/a/one.pdf",
        "input/a/bad.pdf",
        "input/missing.pdf",
        "input/b/two.pdf",
    ];
    let report = pipeline.process_keys(keys).await;

    assert_eq!(report.status, "ok");
    let statuses: Vec<_> = report.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            DocumentStatus::Success,
            DocumentStatus::Failed,
            DocumentStatus::Failed,
            DocumentStatus::Skipped,
        ]
    );
    let sources: Vec<_> = report.results.iter().map(|r| r.source.as_str()).collect();
    let expected: Vec<_> = keys.iter().map(|k| format!("memory://{k}")).collect();
    assert_eq!(sources, expected);
    let unparsed = report.results[1].error.as_deref().unwrap_or_default();
    assert!(unparsed.contains("422"));
    let missing = report.results[2].error.as_deref().unwrap_or_default();
    assert!(missing.contains("not found"));
    assert!(store.exists("output/a/one.md").await.unwrap());
    assert!(!store.exists("output/a/bad.md").await.unwrap());
}

#[tokio::test]
async fn progress_callback_sees_every_document() {
    let store = seeded_store(&["input/a.pdf"]).await;
    let parser = parser_for("a.pdf", json!({"markdown": "a"}));
    let log = Arc::new(EventLog::default());
    let pipeline = DocumentPipeline::new(store, parser, config()).with_progress(log.clone());

    pipeline.process_keys(["input/a.pdf", "input/"]).await;

    let events = log.0.lock().unwrap().clone();
    assert_eq!(events.len(), 4, "{events:?}");
    assert_eq!(events[0], "start 2");
    assert!(events.contains(&"Success memory://input/a.pdf".to_string()));
    assert!(events.contains(&"Skipped memory://input/".to_string()));
    assert_eq!(events[3], "done 1/1/0");
}

#[tokio::test]
async fn handles_s3_event_and_ensures_folders() {
    let store = seeded_store(&["input/medical/my report.pdf"]).await;
    let parser = parser_for("my report.pdf", json!({"markdown": "x"}));
    let pipeline = DocumentPipeline::new(store.clone(), parser, config());

    let event = S3Event::from_json(
        r#"{"Records": [
            {"s3": {"bucket": {"name": "docs"}, "object": {"key": "input/medical/my+report.pdf"}}},
            {"s3": {"bucket": {"name": "docs"}, "object": {"key": "input/medical/"}}}
        ]}"#,
    )
    .unwrap();
    let report = pipeline.handle_event(&event).await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.skipped(), 1);
    assert!(store.exists("output/medical/my report.md").await.unwrap());
    assert!(store.exists("input/").await.unwrap());
    assert!(store.exists("output/").await.unwrap());
}

#[tokio::test]
async fn chunk_images_render_each_page_once() {
    let store = seeded_store(&["input/medical/report.pdf"]).await;
    let parser = parser_for("report.pdf", report_response());
    let renderer = WhitePages::new();
    let cfg = PipelineConfig::builder()
        .chunk_images(true)
        .build()
        .unwrap();
    let cropper = ImageCropper::new(store.clone(), Some(renderer.clone()), cfg.crop.clone());
    let pipeline = DocumentPipeline::new(store.clone(), parser, cfg).with_cropper(cropper);

    let outcome = pipeline.process_key("input/medical/report.pdf").await;
    assert_eq!(outcome.status, DocumentStatus::Success);
    assert_eq!(outcome.chunk_images, 2);
    assert_eq!(renderer.renders.load(Ordering::SeqCst), 2);

    let png = store
        .object("output/medical_chunk_images/report_c1.png")
        .await
        .unwrap();
    assert_eq!(png.content_type, "image/png");
    let img = image::load_from_memory(&png.bytes).unwrap();
    // x: 40..360 ± 10, y: 60..120 ± 10
    assert_eq!((img.width(), img.height()), (340, 80));
    assert!(store
        .exists("output/medical_chunk_images/report_c2.png")
        .await
        .unwrap());
}

#[tokio::test]
async fn chunk_images_without_renderer_warn() {
    let store = seeded_store(&["input/medical/report.pdf"]).await;
    let parser = parser_for("report.pdf", report_response());
    let cfg = PipelineConfig::builder()
        .chunk_images(true)
        .build()
        .unwrap();
    let cropper = ImageCropper::new(store.clone(), None, cfg.crop.clone());
    let pipeline = DocumentPipeline::new(store.clone(), parser, cfg).with_cropper(cropper);

    let outcome = pipeline.process_key("input/medical/report.pdf").await;
    assert_eq!(outcome.status, DocumentStatus::Success);
    assert_eq!(outcome.chunk_images, 0);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(store
        .list("output/medical_chunk_images/")
        .await
        .unwrap()
        .is_empty());
}

// ── Cropper ──────────────────────────────────────────────────────────────────

fn crop_request(bbox: Option<Vec<f64>>) -> ChunkImageRequest {
    ChunkImageRequest {
        source_key: "input/medical/report.pdf".into(),
        output_key: "output/medical_chunk_images/report_c1.png".into(),
        page: 0,
        bbox,
        force: false,
    }
}

#[tokio::test]
async fn cropper_without_renderer_is_unsupported() {
    let store = seeded_store(&["input/medical/report.pdf"]).await;
    let cropper = ImageCropper::new(store.clone(), None, CropOptions::default());
    assert!(!cropper.has_renderer());

    let outcome = cropper
        .extract_chunk_image(&crop_request(Some(vec![0.1, 0.1, 0.5, 0.5])))
        .await
        .unwrap();
    assert_eq!(outcome, CropOutcome::Unsupported);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn cropper_falls_back_to_full_page() {
    let store = seeded_store(&["input/medical/report.pdf"]).await;
    let cropper = white_cropper(store.clone(), WhitePages::new());

    let outcome = cropper
        .extract_chunk_image(&crop_request(Some(vec![0.1, 0.1, 1.5, 0.5])))
        .await
        .unwrap();
    assert!(matches!(outcome, CropOutcome::Written { .. }));

    let bytes = store
        .get("output/medical_chunk_images/report_c1.png")
        .await
        .unwrap();
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!((img.width(), img.height()), (400, 600));
}

#[tokio::test]
async fn cropper_reuses_existing_image() {
    let store = seeded_store(&["input/medical/report.pdf"]).await;
    store
        .insert("output/medical_chunk_images/report_c1.png", b"png".to_vec())
        .await;
    let renderer = WhitePages::new();
    let cropper = white_cropper(store.clone(), renderer.clone());

    let outcome = cropper
        .extract_chunk_image(&crop_request(None))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CropOutcome::Existing {
            key: "output/medical_chunk_images/report_c1.png".into()
        }
    );
    assert_eq!(renderer.renders.load(Ordering::SeqCst), 0);

    let mut forced = crop_request(None);
    forced.force = true;
    let outcome = cropper.extract_chunk_image(&forced).await.unwrap();
    assert!(matches!(outcome, CropOutcome::Written { .. }));
    assert_eq!(renderer.renders.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cropper_missing_source_is_error() {
    let store = seeded_store(&[]).await;
    let cropper = white_cropper(store, WhitePages::new());
    let err = cropper
        .extract_chunk_image(&crop_request(None))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ObjectNotFound { .. }));
}

#[tokio::test]
async fn annotation_tints_chunk_in_type_colour() {
    let store = seeded_store(&["input/medical/report.pdf"]).await;
    let cropper = white_cropper(store.clone(), WhitePages::new());

    let req = AnnotationRequest {
        source_key: "input/medical/report.pdf".into(),
        output_key: "output/medical_chunk_images/report_p0_c1_annotated.png".into(),
        page: 0,
        bbox: NormalizedBox::new(0.25, 0.25, 0.75, 0.5),
        chunk_type: "table".into(),
        force: false,
    };
    let outcome = cropper.annotate_chunk(&req).await.unwrap();
    assert!(matches!(outcome, CropOutcome::Written { .. }));

    let bytes = store.get(&req.output_key).await.unwrap();
    let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
    assert_eq!((img.width(), img.height()), (400, 600));
    // Box spans x 100..300, y 150..300. Outline in table blue, tinted.
    let edge = img.get_pixel(100, 200);
    assert!(edge[2] > edge[0], "edge should be blue-ish: {edge:?}");
    let inside = img.get_pixel(200, 225);
    assert!(
        inside[0] < 255 && inside[2] == 255,
        "inside should be tinted: {inside:?}"
    );
    assert_eq!(img.get_pixel(10, 10), &Rgba([255, 255, 255, 255]));
}

#[tokio::test]
async fn render_errors_surface_from_cropper() {
    let store = seeded_store(&["input/medical/report.pdf"]).await;
    let cropper = white_cropper(store, WhitePages::new());
    let mut req = crop_request(None);
    req.page = 7;
    let err = cropper.extract_chunk_image(&req).await.unwrap_err();
    assert!(matches!(err, IngestError::Render { page: 7, .. }));
}
