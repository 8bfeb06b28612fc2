//! Configuration types for PDF-to-text conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! once at startup via [`ConversionConfigBuilder`] and passed by reference to
//! every pipeline stage. There is no global state: model paths, prompt and
//! runtime tuning all live here.

use crate::error::Pdf2TxtError;
use crate::pipeline::describe::VisionRuntime;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Options for the llama.cpp vision runtime.
///
/// These map one-to-one onto `llama-server` flags and OpenAI-style request
/// parameters; see [`crate::pipeline::describe::LlamaServerRuntime`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// `llama-server` executable. Default: `llama-server` (looked up on `PATH`).
    pub server_bin: PathBuf,

    /// Attach to an already running server at this base URL instead of
    /// spawning one. When set, the model paths are not used.
    pub server_url: Option<String>,

    /// GGUF language/vision model (`--model`).
    pub vision_model_path: Option<PathBuf>,

    /// CLIP / multimodal projector model (`--mmproj`).
    pub clip_model_path: Option<PathBuf>,

    /// Context window in tokens (`--ctx-size`). Default: 4096.
    ///
    /// The image embedding and the prompt both consume context; a dense
    /// scientific figure plus the default prompt fits comfortably in 4096.
    pub context_size: u32,

    /// Layers offloaded to the accelerator (`--n-gpu-layers`). Default: -1 (all).
    pub gpu_layers: i32,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per description. Default: 2048.
    pub max_tokens: usize,

    /// Sampling seed sent with every request. Default: 42.
    ///
    /// A fixed seed together with a low temperature makes repeated runs over
    /// the same document produce the same text.
    pub seed: u64,

    /// How long to wait for the server to report healthy. Default: 120 s.
    pub startup_timeout_secs: u64,

    /// Per-image inference timeout. Default: 300 s.
    pub inference_timeout_secs: u64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            server_bin: PathBuf::from("llama-server"),
            server_url: None,
            vision_model_path: None,
            clip_model_path: None,
            context_size: 4096,
            gpu_layers: -1,
            temperature: 0.1,
            max_tokens: 2048,
            seed: 42,
            startup_timeout_secs: 120,
            inference_timeout_secs: 300,
        }
    }
}

/// Configuration for a PDF-to-text conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2txt::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .vision_model_path("models/pixtral-12b-Q4_K_M.gguf")
///     .clip_model_path("models/mmproj-pixtral-12b-f16.gguf")
///     .context_size(8192)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Default)]
pub struct ConversionConfig {
    /// Vision runtime options (used when no runtime is injected).
    pub runtime: RuntimeOptions,

    /// Pre-constructed vision runtime. Takes precedence over `runtime`.
    ///
    /// The caller keeps ownership of its lifecycle; useful in tests or when
    /// several documents share one loaded model.
    pub vision_runtime: Option<Arc<dyn VisionRuntime>>,

    /// Prompt sent with every image. If None, uses
    /// [`crate::prompts::DEFAULT_IMAGE_PROMPT`].
    pub prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Marker placed between pages. Default: [`PageSeparator::Numbered`].
    pub page_separator: PageSeparator,

    /// Output file. If None, `<pdf stem>.txt` next to the PDF.
    pub output_path: Option<PathBuf>,

    /// Parent directory for the run's temporary image directory.
    /// If None, the system temp directory.
    pub temp_root: Option<PathBuf>,

    /// Optional progress callback, invoked once per image.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("runtime", &self.runtime)
            .field(
                "vision_runtime",
                &self.vision_runtime.as_ref().map(|_| "<dyn VisionRuntime>"),
            )
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("page_separator", &self.page_separator)
            .field("output_path", &self.output_path)
            .field("temp_root", &self.temp_root)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The prompt in effect: the configured one or the built-in default.
    pub fn prompt(&self) -> &str {
        self.prompt
            .as_deref()
            .unwrap_or(crate::prompts::DEFAULT_IMAGE_PROMPT)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn server_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.runtime.server_bin = path.into();
        self
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.runtime.server_url = Some(url.into());
        self
    }

    pub fn vision_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.runtime.vision_model_path = Some(path.into());
        self
    }

    pub fn clip_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.runtime.clip_model_path = Some(path.into());
        self
    }

    pub fn context_size(mut self, tokens: u32) -> Self {
        self.config.runtime.context_size = tokens;
        self
    }

    pub fn gpu_layers(mut self, layers: i32) -> Self {
        self.config.runtime.gpu_layers = layers;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.runtime.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.runtime.max_tokens = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.runtime.seed = seed;
        self
    }

    pub fn startup_timeout_secs(mut self, secs: u64) -> Self {
        self.config.runtime.startup_timeout_secs = secs;
        self
    }

    pub fn inference_timeout_secs(mut self, secs: u64) -> Self {
        self.config.runtime.inference_timeout_secs = secs;
        self
    }

    pub fn vision_runtime(mut self, runtime: Arc<dyn VisionRuntime>) -> Self {
        self.config.vision_runtime = Some(runtime);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = Some(path.into());
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2TxtError> {
        let c = &self.config;
        if c.runtime.context_size < 512 {
            return Err(Pdf2TxtError::InvalidConfig(format!(
                "Context size must be ≥ 512 tokens, got {}",
                c.runtime.context_size
            )));
        }
        if c.runtime.max_tokens == 0 {
            return Err(Pdf2TxtError::InvalidConfig(
                "Max tokens must be ≥ 1".into(),
            ));
        }
        if c.runtime.max_tokens as u64 >= c.runtime.context_size as u64 {
            return Err(Pdf2TxtError::InvalidConfig(format!(
                "Max tokens ({}) must be smaller than the context size ({})",
                c.runtime.max_tokens, c.runtime.context_size
            )));
        }
        if c.runtime.inference_timeout_secs == 0 || c.runtime.startup_timeout_secs == 0 {
            return Err(Pdf2TxtError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if matches!(c.prompt.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(Pdf2TxtError::InvalidConfig("Prompt must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How to mark page boundaries in the assembled text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// A blank line: "\n\n".
    Blank,
    /// Horizontal rule: "\n\n---\n\n".
    Rule,
    /// Numbered banner: "\n\n===== Page N =====\n\n". (default)
    #[default]
    Numbered,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::Blank => "\n\n".to_string(),
            PageSeparator::Rule => "\n\n---\n\n".to_string(),
            PageSeparator::Numbered => format!("\n\n===== Page {} =====\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
