//! Pipeline configuration.
//!
//! All processing behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`] or read from the environment with
//! [`PipelineConfig::from_env`]. The values are fixed for the lifetime of a
//! process: prefixes in particular must not change between invocations or
//! the existence short-circuit stops recognising earlier outputs.
//!
//! # Environment
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `INPUT_FOLDER` | `input/` | prefix watched for uploads |
//! | `OUTPUT_FOLDER` | `output/` | prefix results are written under |
//! | `ADE_MODEL` | `dpt-2-latest` | parse model |
//! | `FORCE_REPROCESS` | `false` | ignore existing markdown outputs |
//! | `CHUNK_IMAGES` | `false` | crop every located chunk |
//! | `ADE_CONCURRENCY` | `4` | documents processed at once |

use crate::crop::CropOptions;
use crate::error::IngestError;
use crate::keys::Prefix;
use crate::pipeline::parser::DEFAULT_MODEL;

/// Configuration for a [`crate::process::DocumentPipeline`].
///
/// # Example
/// ```rust
/// use ade_ingest::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .input_folder("uploads/")
///     .output_folder("processed/")
///     .concurrency(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.output_folder.as_str(), "processed/");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Prefix watched for uploads. Default: `input/`.
    pub input_folder: Prefix,

    /// Prefix results are written under. Default: `output/`.
    pub output_folder: Prefix,

    /// ADE model identifier. Default: `dpt-2-latest`.
    pub model: String,

    /// Reprocess documents whose markdown already exists. Default: false.
    ///
    /// Also forces chunk images to be re-rendered.
    pub force_reprocess: bool,

    /// Documents processed concurrently in a batch. Default: 4.
    ///
    /// Each in-flight document holds its full bytes in memory and one open
    /// parse request, so this is bounded by memory and the API rate limit
    /// rather than CPU.
    pub concurrency: usize,

    /// Crop an image for every located chunk after parsing. Default: false.
    ///
    /// Needs a bound page renderer; without one a single warning is recorded
    /// per document.
    pub chunk_images: bool,

    /// Rendering and drawing parameters for crops and annotations.
    pub crop: CropOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_folder: Prefix::new("input/"),
            output_folder: Prefix::new("output/"),
            model: DEFAULT_MODEL.to_string(),
            force_reprocess: false,
            concurrency: 4,
            chunk_images: false,
            crop: CropOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(v) = lookup("INPUT_FOLDER") {
            builder = builder.input_folder(v);
        }
        if let Some(v) = lookup("OUTPUT_FOLDER") {
            builder = builder.output_folder(v);
        }
        if let Some(v) = lookup("ADE_MODEL").filter(|v| !v.trim().is_empty()) {
            builder = builder.model(v.trim());
        }
        if let Some(v) = lookup("FORCE_REPROCESS") {
            builder = builder.force_reprocess(parse_flag(&v));
        }
        if let Some(v) = lookup("CHUNK_IMAGES") {
            builder = builder.chunk_images(parse_flag(&v));
        }
        if let Some(v) = lookup("ADE_CONCURRENCY") {
            let n = v.trim().parse::<usize>().map_err(|_| {
                IngestError::InvalidConfig(format!("ADE_CONCURRENCY must be a number, got '{v}'"))
            })?;
            builder = builder.concurrency(n);
        }
        builder.build()
    }
}

/// `true` (any case) enables a flag; everything else disables it.
fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_folder(mut self, prefix: impl AsRef<str>) -> Self {
        self.config.input_folder = Prefix::new(prefix);
        self
    }

    pub fn output_folder(mut self, prefix: impl AsRef<str>) -> Self {
        self.config.output_folder = Prefix::new(prefix);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn force_reprocess(mut self, v: bool) -> Self {
        self.config.force_reprocess = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn chunk_images(mut self, v: bool) -> Self {
        self.config.chunk_images = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.crop.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn padding(mut self, px: u32) -> Self {
        self.config.crop.padding = px;
        self
    }

    pub fn highlight(mut self, v: bool) -> Self {
        self.config.crop.highlight = v;
        self
    }

    pub fn crop_options(mut self, options: CropOptions) -> Self {
        self.config.crop = options;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, IngestError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(IngestError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.model.trim().is_empty() {
            return Err(IngestError::InvalidConfig("Model must not be empty".into()));
        }
        if c.crop.dpi < 72 || c.crop.dpi > 400 {
            return Err(IngestError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.crop.dpi
            )));
        }
        // Outputs written under the input prefix would be picked up as new
        // uploads.
        let (input, output) = (c.input_folder.as_str(), c.output_folder.as_str());
        if output.starts_with(input) {
            return Err(IngestError::InvalidConfig(format!(
                "Output folder '{}' must not lie inside input folder '{}'",
                c.output_folder, c.input_folder
            )));
        }
        Ok(self.config)
    }
}
