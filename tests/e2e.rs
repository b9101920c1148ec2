//! End-to-end tests against the live ADE parse API.
//!
//! These make real HTTP calls and cost credits. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 VISION_AGENT_API_KEY=... E2E_PDF=./sample.pdf \
//!     cargo test --test e2e -- --nocapture
//!
//! Chunk crops are exercised too when `PDFIUM_LIB_PATH` points at a pdfium
//! library.

use ade_ingest::{
    AdeClient, DocumentPipeline, DocumentStatus, FsObjectStore, ImageCropper, ObjectStore,
    PageRenderer, PdfiumRenderer, PipelineConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_test::assert_ok;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set and a PDF is available.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if std::env::var("VISION_AGENT_API_KEY").is_err() {
            println!("SKIP: VISION_AGENT_API_KEY is not set");
            return;
        }
        let Some(p) = std::env::var_os("E2E_PDF").map(PathBuf::from) else {
            println!("SKIP: set E2E_PDF to a local PDF file");
            return;
        };
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ade_ingest=info")),
        )
        .with_test_writer()
        .try_init();
}

fn renderer() -> Option<Arc<dyn PageRenderer>> {
    let lib = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
    let renderer = PdfiumRenderer::bind(lib.as_deref())?;
    Some(Arc::new(renderer))
}

async fn stage(store: &FsObjectStore, pdf: &Path, key: &str) {
    let bytes = std::fs::read(pdf).expect("read test pdf");
    assert_ok!(store.put(key, bytes, "application/pdf").await);
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn live_parse_writes_output_family() {
    let pdf = e2e_skip_unless_ready!();
    init_logging();

    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(FsObjectStore::new(root.path()));
    stage(&store, &pdf, "input/e2e/sample.pdf").await;

    let renderer = renderer();
    let config = PipelineConfig::builder()
        .chunk_images(renderer.is_some())
        .build()
        .unwrap();
    let cropper = ImageCropper::new(store.clone(), renderer, config.crop.clone());
    let parser = Arc::new(AdeClient::from_env().unwrap());
    let pipeline = DocumentPipeline::new(store.clone(), parser, config).with_cropper(cropper);

    let outcome = pipeline.process_key("input/e2e/sample.pdf").await;
    println!("{}", serde_json::to_string_pretty(&outcome).unwrap());
    assert_eq!(outcome.status, DocumentStatus::Success, "{outcome:?}");

    let md = store.get("output/e2e/sample.md").await.unwrap();
    let md = String::from_utf8(md).unwrap();
    assert!(!md.trim().is_empty(), "markdown is empty");

    if outcome.chunk_files > 0 {
        assert!(store
            .exists("output/e2e_grounding/sample_grounding.json")
            .await
            .unwrap());
        let chunks = store.list("output/e2e_chunks/").await.unwrap();
        assert_eq!(chunks.len(), outcome.chunk_files);
    }
    if pipeline.config().chunk_images {
        assert!(outcome.chunk_images > 0, "no chunk images: {outcome:?}");
    }
}

#[tokio::test]
async fn live_rerun_is_skipped() {
    let pdf = e2e_skip_unless_ready!();
    init_logging();

    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(FsObjectStore::new(root.path()));
    stage(&store, &pdf, "input/sample.pdf").await;

    let parser = Arc::new(AdeClient::from_env().unwrap());
    let config = PipelineConfig::builder().build().unwrap();
    let pipeline = DocumentPipeline::new(store, parser, config);

    let first = pipeline.process_keys(["input/sample.pdf"]).await;
    assert_eq!(first.succeeded(), 1, "{first:?}");
    let second = pipeline.process_keys(["input/sample.pdf"]).await;
    assert_eq!(second.skipped(), 1, "{second:?}");
}
