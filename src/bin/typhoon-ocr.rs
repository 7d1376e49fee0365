//! CLI binary for typhoon-ocr.
//!
//! `run` OCRs one file or URL and prints the result; `serve` starts the
//! HTTP server. Both read the endpoint from flags or the environment
//! (`TYPHOON_BASE_URL`, `TYPHOON_API_KEY`, `TYPHOON_OCR_MODEL`, `.env`).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use typhoon_ocr::config::{ENV_API_KEY, ENV_BASE_URL, ENV_MODEL};
use typhoon_ocr::output::write_atomic;
use typhoon_ocr::server::{run_server, AppState, ServerConfig};
use typhoon_ocr::{
    resolve_input, DocumentRenderer, EndpointConfig, OcrOptions, OcrProgressCallback,
    OpenAiCompatibleClient, Orchestrator, PageSeparator, ProgressCallback, TaskType,
};

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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar plus one log line per finished page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<u32, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(SPINNER),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn page_elapsed(&self, page: u32) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&page))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl OcrProgressCallback for CliProgressCallback {
    fn on_job_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(SPINNER),
        );
        self.bar.set_prefix("OCR");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page: u32, _total_pages: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(page, Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: u32, _total_pages: usize, text_len: usize) {
        let secs = self.page_elapsed(page);
        self.bar.println(format!(
            "  {} Page {:>3}  {:<12}  {}",
            green("✓"),
            page,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: u32, _total_pages: usize, error: &str) {
        let secs = self.page_elapsed(page);
        let msg: String = if error.chars().count() > 80 {
            format!("{}…", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}  {}  {}",
            red("✗"),
            page,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} page(s) processed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} page(s) processed  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a PDF to stdout
  typhoon-ocr run report.pdf

  # Selected pages, HTML tables and figure descriptions, into a file
  typhoon-ocr run report.pdf --pages 1-3,7 --task structure -o report.md

  # From a URL, through a running relay
  typhoon-ocr run https://example.com/scan.pdf --relay http://localhost:8000/api/proxy-pdf

  # Full JSON result (per-page text, images, tokens, timing)
  typhoon-ocr run scan.png --json > result.json

  # HTTP server
  typhoon-ocr serve --port 8000

ENVIRONMENT VARIABLES:
  TYPHOON_BASE_URL    OpenAI-compatible endpoint, e.g. https://api.opentyphoon.ai/v1
  TYPHOON_API_KEY     API key for the endpoint
  TYPHOON_OCR_MODEL   Model ID (default: typhoon-ocr)
  PDFIUM_LIB_PATH     Path to libpdfium (file or directory)
  RUST_LOG            Log filter, overrides --verbose

A .env file in the working directory is read at startup.
"#;

/// OCR PDFs and images with an OpenAI-compatible vision model.
#[derive(Parser, Debug)]
#[command(
    name = "typhoon-ocr",
    version,
    about = "OCR PDFs and images with an OpenAI-compatible vision model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TYPHOON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TYPHOON_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR a local file or URL.
    Run(RunArgs),
    /// Start the HTTP server.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct EndpointArgs {
    /// Endpoint base URL, up to and including the version segment.
    #[arg(long, env = ENV_BASE_URL)]
    base_url: Option<String>,

    /// Endpoint API key.
    #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID.
    #[arg(long, env = ENV_MODEL)]
    model: Option<String>,

    /// Per-call inference timeout in seconds.
    #[arg(long, env = "TYPHOON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

impl EndpointArgs {
    fn endpoint(&self) -> Result<EndpointConfig> {
        let endpoint = EndpointConfig::from_lookup(|key| match key {
            ENV_BASE_URL => self.base_url.clone(),
            ENV_API_KEY => self.api_key.clone(),
            ENV_MODEL => self.model.clone(),
            _ => None,
        })?;
        Ok(endpoint)
    }

    fn orchestrator(&self, endpoint: EndpointConfig) -> Result<Orchestrator> {
        let client = OpenAiCompatibleClient::new(endpoint, self.api_timeout)
            .context("Failed to create inference client")?;
        Ok(Orchestrator::new(Arc::new(client), Arc::new(DocumentRenderer::new())))
    }
}

#[derive(Args, Debug)]
struct SamplingArgs {
    /// Task type: default (Markdown tables) or structure (HTML tables, figures).
    #[arg(long, env = "TYPHOON_TASK", default_value = "default")]
    task: String,

    /// Max tokens generated per page (1–32768).
    #[arg(long, env = "TYPHOON_MAX_TOKENS", default_value_t = 16384)]
    max_tokens: u32,

    /// Sampling temperature (0.0–1.0).
    #[arg(long, env = "TYPHOON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Nucleus sampling cutoff (0.0–1.0).
    #[arg(long, env = "TYPHOON_TOP_P", default_value_t = 0.6)]
    top_p: f32,

    /// Repetition penalty (1.0–2.0).
    #[arg(long, env = "TYPHOON_REPETITION_PENALTY", default_value_t = 1.2)]
    repetition_penalty: f32,

    /// Retries per page on transient inference errors.
    #[arg(long, env = "TYPHOON_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// Longest edge of page images sent to the model, in pixels.
    #[arg(long, env = "TYPHOON_IMAGE_DIM", default_value_t = 1800)]
    image_dim: u32,
}

impl SamplingArgs {
    fn options(&self, endpoint: &EndpointArgs, model: &str, pages: Option<&str>) -> Result<OcrOptions> {
        let task: TaskType = self.task.parse()?;
        let mut builder = OcrOptions::builder()
            .model(model)
            .request_timeout_secs(endpoint.api_timeout)
            .task_type(task)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .top_p(self.top_p)
            .repetition_penalty(self.repetition_penalty)
            .max_retries(self.max_retries)
            .image_dim(self.image_dim);
        if let Some(pages) = pages {
            builder = builder.page_range(pages);
        }
        builder.build().context("Invalid configuration")
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Local file path or HTTP/HTTPS URL (.pdf, .png, .jpg, .jpeg, .webp, .gif).
    input: String,

    /// Pages to process, e.g. 1,3,5-7. Default: all.
    #[arg(long, env = "TYPHOON_PAGES")]
    pages: Option<String>,

    /// Write output to this file (atomically) instead of stdout.
    #[arg(short, long, env = "TYPHOON_OUTPUT")]
    output: Option<PathBuf>,

    /// Output the full JSON result instead of text.
    #[arg(long, env = "TYPHOON_JSON")]
    json: bool,

    /// Page separator: none, hr, comment, or a custom string.
    #[arg(long, env = "TYPHOON_SEPARATOR", default_value = "none")]
    separator: String,

    /// Fetch URLs through this relay endpoint instead of directly.
    #[arg(long, env = "TYPHOON_RELAY")]
    relay: Option<String>,

    /// Download timeout in seconds.
    #[arg(long, env = "TYPHOON_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Disable the progress bar.
    #[arg(long, env = "TYPHOON_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    endpoint: EndpointArgs,

    #[command(flatten)]
    sampling: SamplingArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "TYPHOON_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "TYPHOON_PORT", default_value_t = 8000)]
    port: u16,

    /// Timeout for relay fetches, in seconds.
    #[arg(long, env = "TYPHOON_RELAY_TIMEOUT", default_value_t = 60)]
    relay_timeout: u64,

    /// Largest accepted upload, in megabytes.
    #[arg(long, env = "TYPHOON_MAX_UPLOAD_MB", default_value_t = 100)]
    max_upload_mb: usize,

    #[command(flatten)]
    endpoint: EndpointArgs,

    #[command(flatten)]
    sampling: SamplingArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so `.env` values can satisfy `env = ...` flags.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; the server always logs.
    let show_progress = match &cli.command {
        Command::Run(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => run(args, cli.quiet, show_progress).await,
        Command::Serve(args) => serve(args).await,
    }
}

async fn run(args: RunArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let endpoint = args.endpoint.endpoint()?;
    let options = args
        .sampling
        .options(&args.endpoint, &endpoint.model, args.pages.as_deref())?;
    let orchestrator = args.endpoint.orchestrator(endpoint)?;
    let separator: PageSeparator = args.separator.parse().unwrap_or_default();

    let document = resolve_input(&args.input, args.relay.as_deref(), args.download_timeout)
        .await
        .with_context(|| format!("Failed to load '{}'", args.input))?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn OcrProgressCallback>)
    } else {
        None
    };

    let result = orchestrator.run(Some(&document), &options, progress).await;
    if !result.success {
        anyhow::bail!(
            "OCR failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    let body = if args.json {
        serde_json::to_string_pretty(&result).context("Failed to serialise result")?
    } else {
        result.combined(&separator)
    };

    match &args.output {
        Some(path) => {
            write_atomic(path, body.as_bytes())?;
            if !quiet {
                eprintln!(
                    "{}  {}/{} pages  {:.2}s  →  {}",
                    if result.failed_pages() == 0 { green("✔") } else { cyan("⚠") },
                    result.succeeded_pages(),
                    result.results.len(),
                    result.processing_time,
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(body.as_bytes())
                .context("Failed to write to stdout")?;
            if !body.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !quiet && !args.json {
        eprintln!(
            "   {} tokens  —  {:.2}s total",
            dim(&result.total_tokens.to_string()),
            result.processing_time,
        );
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let endpoint = args.endpoint.endpoint()?;
    let defaults = args.sampling.options(&args.endpoint, &endpoint.model, None)?;
    let orchestrator = args.endpoint.orchestrator(endpoint)?;

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        relay_timeout_secs: args.relay_timeout,
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    };
    let state = AppState::new(orchestrator, defaults, config.relay_timeout_secs);
    run_server(config, state).await.context("Server failed")?;
    Ok(())
}
