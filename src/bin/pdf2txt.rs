//! CLI binary for pdf2txt.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2txt::{
    convert_to_file, inspect, ConversionConfig, ConversionOutput, ConversionProgressCallback,
    PageSeparator, ProgressCallback,
};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the PDF is read, then one bar
/// tick and one log line per described image.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the image currently being described.
    image_started: Mutex<Option<Instant>>,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Extracting");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            image_started: Mutex::new(None),
            fallbacks: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Describing");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self) -> f64 {
        self.image_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Drop the bar without a summary, e.g. when the run failed.
    fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_extraction_complete(&self, total_pages: usize, total_images: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{total_pages} pages, {total_images} images to describe"
            ))
        ));
        if total_images > 0 {
            self.activate_bar(total_images);
        } else {
            self.bar.set_prefix("Assembling");
            self.bar.set_message("");
        }
    }

    fn on_image_start(&self, _index: usize, _total: usize, token: &str) {
        if let Ok(mut started) = self.image_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(token.to_string());
    }

    fn on_image_complete(&self, index: usize, total: usize, description_len: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            index,
            total,
            dim(&format!("{description_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs();
        self.fallbacks.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_images: usize, described: usize) {
        self.bar.finish_and_clear();
        let fallbacks = self.fallbacks.load(Ordering::SeqCst);

        if total_images == 0 {
            eprintln!("{} no images to describe", green("✔"));
        } else if fallbacks == 0 {
            eprintln!(
                "{} {} images described",
                green("✔"),
                bold(&described.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images described  ({} fell back)",
                if described == 0 { red("✘") } else { cyan("⚠") },
                bold(&described.to_string()),
                total_images,
                red(&fallbacks.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert next to the input (paper.pdf → paper.txt)
  pdf2txt convert paper.pdf \
      --vision_model_path models/qwen2-vl-7b-instruct-q4_k_m.gguf \
      --clip_model_path models/mmproj-qwen2-vl-7b-instruct-f16.gguf

  # Models from the environment, output elsewhere
  export PDF2TXT_VISION_MODEL=models/qwen2-vl-7b-instruct-q4_k_m.gguf
  export PDF2TXT_CLIP_MODEL=models/mmproj-qwen2-vl-7b-instruct-f16.gguf
  pdf2txt convert paper.pdf -o out/paper.txt

  # Use an already running llama-server
  pdf2txt convert paper.pdf --server-url http://127.0.0.1:8080

  # Custom prompt, JSON report on stdout
  pdf2txt convert paper.pdf --prompt-file prompts/figures.txt --json > report.json

  # Inspect PDF metadata (no models needed)
  pdf2txt inspect paper.pdf

ENVIRONMENT VARIABLES:
  PDF2TXT_VISION_MODEL    Vision model GGUF file
  PDF2TXT_CLIP_MODEL      Multimodal projector (mmproj) GGUF file
  PDF2TXT_PROMPT          Prompt sent with every image
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, overrides -v / -q

SETUP:
  1. Install llama.cpp so that `llama-server` is on PATH (or pass --server-bin).
  2. Download a vision model and its matching mmproj file (GGUF).
  3. Make libpdfium available: system library, ./libpdfium, or PDFIUM_LIB_PATH.
"#;

/// Convert PDF files to plain text, describing images with a local vision model.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2txt",
    version,
    about = "Convert PDF files to text, replacing images with vision-model descriptions",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Append run logs to this file.
    #[arg(long, global = true, env = "PDF2TXT_LOG_FILE", default_value = "pdf_converter.log")]
    log_file: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2TXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2TXT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a PDF to <stem>.txt.
    Convert(ConvertArgs),
    /// Print PDF metadata, no conversion.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// PDF file to convert.
    pdf_path: PathBuf,

    /// Vision model weights (GGUF).
    #[arg(long = "vision_model_path", alias = "vision-model-path", env = "PDF2TXT_VISION_MODEL")]
    vision_model_path: Option<PathBuf>,

    /// Multimodal projector weights (GGUF).
    #[arg(long = "clip_model_path", alias = "clip-model-path", env = "PDF2TXT_CLIP_MODEL")]
    clip_model_path: Option<PathBuf>,

    /// Prompt sent with every image.
    #[arg(long, env = "PDF2TXT_PROMPT")]
    prompt: Option<String>,

    /// Read the prompt from a text file (takes precedence over --prompt).
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Write text here instead of <stem>.txt next to the PDF.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2TXT_PASSWORD")]
    password: Option<String>,

    /// Model context window in tokens.
    #[arg(long, default_value_t = 4096)]
    ctx_size: u32,

    /// Layers to offload to the GPU (-1 = all, 0 = CPU only).
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    gpu_layers: i32,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, default_value_t = 0.1)]
    temperature: f32,

    /// Max tokens generated per image.
    #[arg(long, default_value_t = 2048)]
    max_tokens: usize,

    /// Sampling seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// llama-server executable.
    #[arg(long, env = "PDF2TXT_SERVER_BIN", default_value = "llama-server")]
    server_bin: PathBuf,

    /// Use a running llama-server at this URL instead of starting one.
    #[arg(long, env = "PDF2TXT_SERVER_URL")]
    server_url: Option<String>,

    /// Seconds to wait for the vision runtime to become ready.
    #[arg(long, default_value_t = 120)]
    startup_timeout: u64,

    /// Seconds allowed per image description.
    #[arg(long, default_value_t = 300)]
    inference_timeout: u64,

    /// Page separator: blank, rule, numbered, or a custom string.
    #[arg(long, default_value = "numbered")]
    separator: String,

    /// Print the conversion report (ConversionOutput) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2TXT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// PDF file to inspect.
    pdf_path: PathBuf,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2TXT_PASSWORD")]
    password: Option<String>,

    /// Print metadata as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Suppress INFO-level logs on stderr when the progress bar is active;
    // the log file still receives them.
    let show_progress = match cli.command {
        Command::Convert(ref args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Inspect(_) => false,
    };
    init_logging(&cli, show_progress);

    match run(cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::FAILURE
        }
    }
}

/// stderr layer plus an ANSI-free layer appending to the log file.
fn init_logging(cli: &Cli, show_progress: bool) {
    let level = if cli.verbose { "debug" } else { "info" };
    let stderr_level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let filter = |default: &str| {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file);
    let (file_layer, file_error) = match file {
        Ok(f) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(f))
                    .with_filter(filter(level)),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_filter(filter(stderr_level)),
        )
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("Cannot open log file {}: {}", cli.log_file.display(), e);
    }
}

async fn run(cli: Cli, show_progress: bool) -> Result<()> {
    match cli.command {
        Command::Convert(ref args) => run_convert(args, cli.quiet, show_progress).await,
        Command::Inspect(ref args) => run_inspect(args).await,
    }
}

async fn run_convert(args: &ConvertArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let progress_cb = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        args,
        progress_cb
            .clone()
            .map(|cb| cb as Arc<dyn ConversionProgressCallback>),
    )
    .await?;

    let output = match convert_to_file(&args.pdf_path, &config).await {
        Ok(output) => output,
        Err(e) => {
            if let Some(ref cb) = progress_cb {
                cb.clear();
            }
            return Err(stage_error(e, &args.pdf_path));
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }
    if !quiet && !args.json {
        print_summary(&output, !show_progress);
    }
    Ok(())
}

/// `<stage> failed for '<path>': <cause>`
fn stage_error(e: pdf2txt::Pdf2TxtError, pdf_path: &Path) -> anyhow::Error {
    let stage = e.stage();
    anyhow::Error::new(e).context(format!("{} failed for '{}'", stage, pdf_path.display()))
}

fn print_summary(output: &ConversionOutput, with_counts: bool) {
    let stats = &output.stats;
    if with_counts {
        eprintln!(
            "Converted {} pages, {}/{} images described",
            stats.total_pages, stats.images_described, stats.images_found
        );
        if stats.images_fallback > 0 {
            eprintln!("  {} images fell back", stats.images_fallback);
        }
    }
    if stats.images_skipped > 0 {
        eprintln!(
            "  {} {} images could not be decoded and were skipped",
            cyan("⚠"),
            stats.images_skipped
        );
    }
    let destination = output
        .output_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    eprintln!(
        "{}  {} pages  {}ms  →  {}",
        if stats.images_fallback == 0 && stats.images_skipped == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.total_pages,
        stats.total_duration_ms,
        bold(&destination),
    );
    eprintln!(
        "   {} extract  /  {} describe",
        dim(&format!("{}ms", stats.extract_duration_ms)),
        dim(&format!("{}ms", stats.describe_duration_ms)),
    );
}

async fn run_inspect(args: &InspectArgs) -> Result<()> {
    let meta = inspect(&args.pdf_path, args.password.as_deref())
        .await
        .map_err(|e| stage_error(e, &args.pdf_path))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
        );
    } else {
        println!("File:         {}", args.pdf_path.display());
        if let Some(ref t) = meta.title {
            println!("Title:        {}", t);
        }
        if let Some(ref a) = meta.author {
            println!("Author:       {}", a);
        }
        if let Some(ref s) = meta.subject {
            println!("Subject:      {}", s);
        }
        println!("Pages:        {}", meta.page_count);
        println!("Images:       {}", meta.image_count);
        println!("PDF Version:  {}", meta.pdf_version);
        if let Some(ref p) = meta.producer {
            println!("Producer:     {}", p);
        }
        if let Some(ref c) = meta.creator {
            println!("Creator:      {}", c);
        }
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(
    args: &ConvertArgs,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig> {
    let prompt = match (&args.prompt, &args.prompt_file) {
        (_, Some(path)) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        ),
        (Some(p), None) => Some(p.clone()),
        (None, None) => None,
    };

    let mut builder = ConversionConfig::builder()
        .server_bin(&args.server_bin)
        .context_size(args.ctx_size)
        .gpu_layers(args.gpu_layers)
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .seed(args.seed)
        .startup_timeout_secs(args.startup_timeout)
        .inference_timeout_secs(args.inference_timeout)
        .page_separator(parse_separator(&args.separator));

    if let Some(ref path) = args.vision_model_path {
        builder = builder.vision_model_path(path);
    }
    if let Some(ref path) = args.clip_model_path {
        builder = builder.clip_model_path(path);
    }
    if let Some(ref url) = args.server_url {
        builder = builder.server_url(url);
    }
    if let Some(prompt) = prompt {
        builder = builder.prompt(prompt);
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd);
    }
    if let Some(ref out) = args.output {
        builder = builder.output_path(out);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "blank" | "none" => PageSeparator::Blank,
        "rule" | "hr" | "---" => PageSeparator::Rule,
        "numbered" => PageSeparator::Numbered,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
