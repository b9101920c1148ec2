//! CLI binary for ade-ingest.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `PipelineConfig`, opens the object store, and prints results as JSON.

use ade_ingest::crop::{AnnotationRequest, ChunkImageRequest};
use ade_ingest::output::group_by_folder;
use ade_ingest::pipeline::parser::{AdeClient, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use ade_ingest::{
    derive_output_keys, upload_directory, BatchProgressCallback, BatchReport, CropOptions,
    CropOutcome, DocumentOutcome, DocumentPipeline, DocumentStatus, FsObjectStore, ImageCropper,
    NormalizedBox, ObjectStore, PageRenderer, PdfiumRenderer, PipelineConfig, Prefix, S3Event,
    UploadOptions,
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar with one log line per finished document. Documents
/// complete out of order when concurrency > 1.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: ProgressBar::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_document_start(&self, key: &str) {
        self.bar.set_message(key.to_string());
    }

    fn on_document_complete(&self, outcome: &DocumentOutcome) {
        let line = match outcome.status {
            DocumentStatus::Success => format!(
                "  {} {}  {}",
                green("✓"),
                outcome.source,
                dim(&format!(
                    "{} chunks, {} images",
                    outcome.chunk_files, outcome.chunk_images
                ))
            ),
            DocumentStatus::Skipped => format!(
                "  {} {}  {}",
                dim("⏭"),
                outcome.source,
                dim(outcome.reason.map(|r| r.as_str()).unwrap_or("skipped"))
            ),
            DocumentStatus::Failed => {
                let err = outcome.error.as_deref().unwrap_or("unknown error");
                let msg: String = err.chars().take(100).collect();
                format!("  {} {}  {}", red("✗"), outcome.source, red(&msg))
            }
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, succeeded: usize, skipped: usize, failed: usize) {
        self.bar.finish_and_clear();
        let mark = if failed == 0 { green("✔") } else { red("✘") };
        eprintln!(
            "{} {} processed, {} skipped, {} failed",
            mark,
            bold(&succeeded.to_string()),
            skipped,
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process everything under input/ in a local directory acting as the bucket
  ade-ingest --root ./bucket process --all

  # Process specific keys in an S3 bucket, with chunk crops
  ade-ingest --bucket my-docs process input/medical/report.pdf --chunk-images

  # Replay an S3 notification payload (as delivered to a function handler)
  ade-ingest --bucket my-docs event notification.json

  # Crop one chunk (page index is 0-based, box is normalized l,t,r,b)
  ade-ingest --root ./bucket crop input/medical/report.pdf --page 0 \
      --bbox 0.1,0.2,0.9,0.35 --chunk-id 3f2a

  # Upload a local folder into input/, PDFs only
  ade-ingest --bucket my-docs upload ./docs --ext pdf

  # Inventory of produced outputs
  ade-ingest --bucket my-docs list

ENVIRONMENT VARIABLES:
  VISION_AGENT_API_KEY  LandingAI ADE API key
  ADE_MODEL             Parse model (default dpt-2-latest)
  ADE_ENDPOINT          Parse endpoint override
  ADE_BUCKET            S3 bucket (instead of --bucket)
  ADE_ROOT              Local directory store (instead of --root)
  INPUT_FOLDER          Input prefix (default input/)
  OUTPUT_FOLDER         Output prefix (default output/)
  FORCE_REPROCESS       "true" to ignore existing outputs
  PDFIUM_LIB_PATH       pdfium shared library (file or directory)
  AWS_REGION, AWS_PROFILE, …   standard AWS SDK configuration
"#;

/// Parse documents uploaded to an object store with LandingAI ADE.
#[derive(Parser, Debug)]
#[command(
    name = "ade-ingest",
    version,
    about = "Parse documents in an object store with LandingAI ADE and write markdown, grounding and chunk images",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// S3 bucket holding the input and output prefixes.
    #[cfg(feature = "s3")]
    #[arg(long, env = "ADE_BUCKET", global = true, conflicts_with = "root")]
    bucket: Option<String>,

    /// Local directory used as the bucket.
    #[arg(long, env = "ADE_ROOT", global = true)]
    root: Option<PathBuf>,

    /// Prefix watched for uploads.
    #[arg(long, env = "INPUT_FOLDER", default_value = "input/", global = true)]
    input_folder: String,

    /// Prefix results are written under.
    #[arg(long, env = "OUTPUT_FOLDER", default_value = "output/", global = true)]
    output_folder: String,

    /// pdfium shared library (file or containing directory).
    #[arg(long, env = "PDFIUM_LIB_PATH", global = true)]
    pdfium_lib: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "ADE_NO_PROGRESS", global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process input keys (or every key under the input prefix).
    Process {
        /// Input keys, e.g. input/medical/report.pdf.
        keys: Vec<String>,

        /// Process every object under the input prefix.
        #[arg(long, conflicts_with = "keys")]
        all: bool,

        #[command(flatten)]
        parse: ParseArgs,
    },

    /// Process an S3 event notification (file path, or - for stdin).
    Event {
        payload: String,

        #[command(flatten)]
        parse: ParseArgs,
    },

    /// Store a cropped image of one chunk.
    Crop {
        /// Source document key.
        source: String,

        #[command(flatten)]
        chunk: ChunkArgs,

        /// Do not outline the chunk inside the crop.
        #[arg(long)]
        no_highlight: bool,

        /// Pixels of context around the chunk.
        #[arg(long, default_value_t = 10)]
        padding: u32,
    },

    /// Store the full page with one chunk outlined.
    Annotate {
        /// Source document key.
        source: String,

        #[command(flatten)]
        chunk: ChunkArgs,

        /// Chunk type, selects the outline colour.
        #[arg(long, default_value = "text")]
        chunk_type: String,
    },

    /// Upload a local directory into the input prefix.
    Upload {
        dir: PathBuf,

        /// Only upload these extensions (comma separated).
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,

        /// Replace objects that already exist.
        #[arg(long)]
        overwrite: bool,
    },

    /// List produced outputs grouped by folder.
    List {
        /// Print the full key list as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// LandingAI ADE API key.
    #[arg(long, env = "VISION_AGENT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Parse endpoint.
    #[arg(long, env = "ADE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Parse model.
    #[arg(long, env = "ADE_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Parse request timeout in seconds.
    #[arg(long, env = "ADE_TIMEOUT", default_value_t = AdeClient::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Reprocess documents whose markdown already exists. Takes an explicit
    /// value only as `--force=<bool>`.
    #[arg(long, env = "FORCE_REPROCESS", value_parser = parse_flag,
          num_args = 0..=1, require_equals = true,
          default_value = "false", default_missing_value = "true")]
    force: bool,

    /// Documents processed at once.
    #[arg(short, long, env = "ADE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Crop an image for every located chunk (needs pdfium).
    #[arg(long, env = "CHUNK_IMAGES")]
    chunk_images: bool,

    /// Rendering DPI for chunk images (72–400).
    #[arg(long, default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,
}

#[derive(Args, Debug)]
struct ChunkArgs {
    /// 0-based page index.
    #[arg(long)]
    page: u32,

    /// Normalized box: left,top,right,bottom. Omit for the full page.
    #[arg(long, value_delimiter = ',', num_args = 1)]
    bbox: Vec<f64>,

    /// Chunk id used to name the output image.
    #[arg(long)]
    chunk_id: Option<String>,

    /// Output key; derived from the source key and chunk id when omitted.
    #[arg(long)]
    output: Option<String>,

    /// Re-render even when the output exists.
    #[arg(long)]
    force: bool,

    /// Rendering DPI (72–400).
    #[arg(long, default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,
}

/// `FORCE_REPROCESS` semantics: only "true" (any case) enables.
fn parse_flag(raw: &str) -> Result<bool, String> {
    Ok(raw.trim().eq_ignore_ascii_case("true"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for batch commands.
    let batch = matches!(cli.command, Command::Process { .. } | Command::Event { .. });
    let show_progress = batch && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Process { keys, all, parse } => {
            let store = open_store(&cli).await?;
            let pipeline = build_pipeline(&cli, parse, store.clone(), show_progress)?;
            let keys = if *all {
                store
                    .list(pipeline.config().input_folder.as_str())
                    .await
                    .context("Failed to list input prefix")?
            } else if keys.is_empty() {
                bail!("Pass input keys or --all");
            } else {
                keys.clone()
            };
            let report = pipeline.process_keys(keys).await;
            finish(&report)
        }

        Command::Event { payload, parse } => {
            let raw = read_payload(payload)?;
            let event = S3Event::from_json(&raw).context("Invalid event payload")?;
            let report = run_event(&cli, parse, &event, show_progress).await?;
            finish(&report)
        }

        Command::Crop {
            source,
            chunk,
            no_highlight,
            padding,
        } => {
            let store = open_store(&cli).await?;
            let options = CropOptions {
                dpi: chunk.dpi,
                padding: *padding,
                highlight: !no_highlight,
                ..CropOptions::default()
            };
            let cropper = build_cropper(&cli, store, options);
            let output_key = match &chunk.output {
                Some(key) => key.clone(),
                None => {
                    let keys = derived_keys(&cli, source)?;
                    keys.chunk_image_key(&chunk_name(chunk))
                }
            };
            let req = ChunkImageRequest {
                source_key: source.clone(),
                output_key,
                page: chunk.page,
                bbox: (!chunk.bbox.is_empty()).then(|| chunk.bbox.clone()),
                force: chunk.force,
            };
            let outcome = cropper
                .extract_chunk_image(&req)
                .await
                .context("Crop failed")?;
            report_crop(&cli, &outcome)
        }

        Command::Annotate {
            source,
            chunk,
            chunk_type,
        } => {
            let store = open_store(&cli).await?;
            let options = CropOptions {
                dpi: chunk.dpi,
                ..CropOptions::default()
            };
            let cropper = build_cropper(&cli, store, options);
            let bbox = match chunk.bbox.as_slice() {
                [] => NormalizedBox::new(0.0, 0.0, 1.0, 1.0),
                [l, t, r, b] => NormalizedBox::clamped(*l, *t, *r, *b),
                other => bail!("--bbox needs 4 values, got {}", other.len()),
            };
            let output_key = match &chunk.output {
                Some(key) => key.clone(),
                None => {
                    let keys = derived_keys(&cli, source)?;
                    keys.annotation_key(chunk.page, &chunk_name(chunk))
                }
            };
            let req = AnnotationRequest {
                source_key: source.clone(),
                output_key,
                page: chunk.page,
                bbox,
                chunk_type: chunk_type.clone(),
                force: chunk.force,
            };
            let outcome = cropper
                .annotate_chunk(&req)
                .await
                .context("Annotation failed")?;
            report_crop(&cli, &outcome)
        }

        Command::Upload {
            dir,
            ext,
            overwrite,
        } => {
            let store = open_store(&cli).await?;
            let options = UploadOptions {
                extensions: ext.clone(),
                skip_existing: !overwrite,
            };
            let prefix = Prefix::new(&cli.input_folder);
            let summary = upload_directory(store.as_ref(), dir, &prefix, &options)
                .await
                .with_context(|| format!("Upload of {} failed", dir.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{} Uploaded {} files, skipped {} existing files",
                    green("✔"),
                    bold(&summary.uploaded.len().to_string()),
                    summary.skipped.len()
                );
            }
            print_json(&summary, "summary")
        }

        Command::List { json } => {
            let store = open_store(&cli).await?;
            let prefix = Prefix::new(&cli.output_folder);
            let keys = store
                .list(prefix.as_str())
                .await
                .context("Failed to list output prefix")?;
            let groups = group_by_folder(keys.iter().map(String::as_str), prefix.as_str());
            if *json {
                print_json(&groups, "listing")?;
            } else {
                let total: usize = groups.values().map(Vec::len).sum();
                println!("{} files in {}", total, store.location(prefix.as_str()));
                for (folder, files) in &groups {
                    let label = if folder.is_empty() {
                        format!("{prefix} (root)")
                    } else {
                        format!("{prefix}{folder}/")
                    };
                    println!("  {:<40} {} files", label, files.len());
                }
            }
            Ok(())
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

async fn open_store(cli: &Cli) -> Result<Arc<dyn ObjectStore>> {
    if let Some(root) = &cli.root {
        return Ok(Arc::new(FsObjectStore::new(root)));
    }
    #[cfg(feature = "s3")]
    {
        if let Some(bucket) = &cli.bucket {
            let store = ade_ingest::S3ObjectStore::from_env(bucket.clone()).await;
            return Ok(Arc::new(store));
        }
    }
    bail!(
        "No object store configured: pass --bucket or --root (or set ADE_BUCKET / ADE_ROOT)"
    )
}

fn pipeline_config(cli: &Cli, parse: &ParseArgs) -> Result<PipelineConfig> {
    PipelineConfig::builder()
        .input_folder(&cli.input_folder)
        .output_folder(&cli.output_folder)
        .model(parse.model.clone())
        .force_reprocess(parse.force)
        .concurrency(parse.concurrency)
        .chunk_images(parse.chunk_images)
        .dpi(parse.dpi)
        .build()
        .context("Invalid configuration")
}

fn renderer(cli: &Cli) -> Option<Arc<dyn PageRenderer>> {
    let renderer = PdfiumRenderer::bind(cli.pdfium_lib.as_deref())?;
    Some(Arc::new(renderer))
}

fn build_cropper(cli: &Cli, store: Arc<dyn ObjectStore>, options: CropOptions) -> ImageCropper {
    ImageCropper::new(store, renderer(cli), options)
}

fn build_pipeline(
    cli: &Cli,
    parse: &ParseArgs,
    store: Arc<dyn ObjectStore>,
    show_progress: bool,
) -> Result<DocumentPipeline> {
    let config = pipeline_config(cli, parse)?;
    let api_key = parse
        .api_key
        .clone()
        .context("VISION_AGENT_API_KEY is not set (or pass --api-key)")?;
    let parser = AdeClient::with_options(api_key, parse.endpoint.clone(), parse.timeout)
        .context("Failed to create ADE client")?;

    let mut pipeline = DocumentPipeline::new(store.clone(), Arc::new(parser), config.clone());
    if config.chunk_images {
        pipeline = pipeline.with_cropper(build_cropper(cli, store, config.crop.clone()));
    }
    if show_progress {
        pipeline = pipeline.with_progress(CliProgressCallback::new());
    }
    Ok(pipeline)
}

/// Run an event, one pipeline per bucket when backed by S3.
async fn run_event(
    cli: &Cli,
    parse: &ParseArgs,
    event: &S3Event,
    show_progress: bool,
) -> Result<BatchReport> {
    #[cfg(feature = "s3")]
    {
        if cli.root.is_none() && cli.bucket.is_none() {
            let mut buckets: Vec<String> = Vec::new();
            for record in &event.records {
                if !buckets.contains(&record.s3.bucket.name) {
                    buckets.push(record.s3.bucket.name.clone());
                }
            }
            let mut results = Vec::new();
            for bucket in buckets {
                let store: Arc<dyn ObjectStore> =
                    Arc::new(ade_ingest::S3ObjectStore::from_env(bucket.clone()).await);
                let pipeline = build_pipeline(cli, parse, store, show_progress)?;
                let subset = S3Event {
                    records: event
                        .records
                        .iter()
                        .filter(|r| r.s3.bucket.name == bucket)
                        .cloned()
                        .collect(),
                };
                results.extend(pipeline.handle_event(&subset).await.results);
            }
            return Ok(BatchReport::new(results));
        }
    }

    let store = open_store(cli).await?;
    let pipeline = build_pipeline(cli, parse, store, show_progress)?;
    Ok(pipeline.handle_event(event).await)
}

fn read_payload(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))
    }
}

fn derived_keys(cli: &Cli, source: &str) -> Result<ade_ingest::OutputKeySet> {
    derive_output_keys(
        source,
        &Prefix::new(&cli.input_folder),
        &Prefix::new(&cli.output_folder),
    )
    .with_context(|| {
        format!(
            "'{source}' is not a document under '{}'; pass --output",
            cli.input_folder
        )
    })
}

fn print_json(value: &impl serde::Serialize, what: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialise {what}"))?;
    println!("{json}");
    Ok(())
}

fn chunk_name(chunk: &ChunkArgs) -> String {
    chunk
        .chunk_id
        .clone()
        .unwrap_or_else(|| format!("page{}", chunk.page))
}

fn report_crop(cli: &Cli, outcome: &CropOutcome) -> Result<()> {
    match outcome {
        CropOutcome::Written { key } | CropOutcome::Existing { key } => {
            if !cli.quiet {
                let verb = if matches!(outcome, CropOutcome::Written { .. }) {
                    "Stored"
                } else {
                    "Already present"
                };
                eprintln!("{} {}", green("✔"), verb);
            }
            println!("{key}");
            Ok(())
        }
        CropOutcome::Unsupported => {
            bail!(
                "Page rendering is unavailable: install pdfium or set PDFIUM_LIB_PATH"
            )
        }
    }
}

fn finish(report: &BatchReport) -> Result<()> {
    print_json(report, "report")?;
    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
