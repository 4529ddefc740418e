//! CLI binary for pii-redactor.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `RedactionConfig`, wires the HTTP service clients to a local object store,
//! and prints the run result.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pii_redactor::testing::MemoryObjectStore;
use pii_redactor::{
    run, scan_document, DocumentRef, HttpEntityDetection, HttpTextExtraction, JobStatus,
    LocalObjectStore, MaskScope, ObjectStore, ProgressCallback, RedactionConfig, RedactionMode,
    RedactionProgressCallback, Services,
};
use serde_json::{json, Value};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the extraction job runs, then a bar over the scanned lines.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Extracting");
        bar.set_message("Submitting job…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl RedactionProgressCallback for CliProgressCallback {
    fn on_job_submitted(&self, doc: &DocumentRef, job_id: &str) {
        self.bar.println(format!("  job {} for {}", bold(job_id), doc));
        self.bar.set_message("Waiting for extraction…");
    }

    fn on_poll(&self, _job_id: &str, attempt: u32, status: JobStatus) {
        self.bar.set_message(format!("poll #{attempt}: {status}"));
    }

    fn on_scan_start(&self, total_lines: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>4}/{len} lines  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_lines as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Scanning");
        self.bar.set_message("");
    }

    fn on_line_scanned(&self, _index: usize, _total: usize, entity_count: usize) {
        if entity_count > 0 {
            self.bar.set_message(format!("{entity_count} entities on last flagged line"));
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&self, success: bool, message: &str) {
        self.bar.finish_and_clear();
        if success {
            eprintln!("{} {}", green("✔"), message);
        } else {
            eprintln!("{} {}", red("✘"), message);
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Handle a storage notification saved to a file
  pii-redact event.json --extraction-url http://localhost:9000 --detection-url http://localhost:9001

  # Name the document directly
  pii-redact --bucket docs --key scans/form.png --store-root ./buckets

  # Only mask the detected spans, four detection calls at a time
  pii-redact event.json --scope entity --concurrency 4

  # Report flagged lines without writing anything
  pii-redact --bucket docs --key scans/form.png --scan-only

  # Print the redacted payload without writing it
  pii-redact event.json --dry-run

  # Print the function-host response shape
  pii-redact event.json --lambda

ENVIRONMENT VARIABLES:
  PII_REDACT_STORE_ROOT      Directory holding one sub-directory per bucket
  PII_REDACT_EXTRACTION_URL  Base URL of the text-extraction service
  PII_REDACT_DETECTION_URL   Base URL of the entity-detection service
  RUST_LOG                   Overrides the log filter
"#;

/// Mask PII in text extracted from stored documents.
#[derive(Parser, Debug)]
#[command(
    name = "pii-redact",
    version,
    about = "Mask PII in text extracted from stored documents",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Storage notification JSON file, or `-` for stdin.
    #[arg(conflicts_with_all = ["bucket", "key"])]
    event: Option<PathBuf>,

    /// Bucket of the document (instead of a notification).
    #[arg(long, requires = "key")]
    bucket: Option<String>,

    /// Key of the document (instead of a notification).
    #[arg(long, requires = "bucket")]
    key: Option<String>,

    /// Root directory of the local object store.
    #[arg(long, env = "PII_REDACT_STORE_ROOT", default_value = ".")]
    store_root: PathBuf,

    /// Base URL of the text-extraction service.
    #[arg(long, env = "PII_REDACT_EXTRACTION_URL", default_value = "http://localhost:9000")]
    extraction_url: String,

    /// Base URL of the entity-detection service.
    #[arg(long, env = "PII_REDACT_DETECTION_URL", default_value = "http://localhost:9001")]
    detection_url: String,

    /// Milliseconds between status polls.
    #[arg(long, env = "PII_REDACT_POLL_INTERVAL_MS", default_value_t = 5_000)]
    poll_interval_ms: u64,

    /// Maximum number of status polls.
    #[arg(long, env = "PII_REDACT_MAX_POLLS", default_value_t = 120)]
    max_polls: u32,

    /// Wall-clock limit for extraction in seconds; 0 disables it.
    #[arg(long, env = "PII_REDACT_POLL_DEADLINE", default_value_t = 900)]
    poll_deadline: u64,

    /// Language code sent to entity detection.
    #[arg(long, env = "PII_REDACT_LANGUAGE", default_value = "en")]
    language: String,

    /// Mask character.
    #[arg(long, env = "PII_REDACT_MASK_CHAR", default_value_t = '*')]
    mask_char: char,

    /// Where masks are applied.
    #[arg(long, env = "PII_REDACT_MODE", value_enum, default_value = "structured")]
    mode: ModeArg,

    /// Mask whole lines or only detected spans.
    #[arg(long, env = "PII_REDACT_SCOPE", value_enum, default_value = "line")]
    scope: ScopeArg,

    /// Detection calls in flight at once.
    #[arg(short, long, env = "PII_REDACT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Prefix of the output key.
    #[arg(long, env = "PII_REDACT_OUTPUT_PREFIX", default_value = "redacted/")]
    output_prefix: String,

    /// Pretty-print the stored JSON.
    #[arg(long, env = "PII_REDACT_PRETTY")]
    pretty: bool,

    /// Per-request timeout for service calls, in seconds.
    #[arg(long, env = "PII_REDACT_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Extract and scan only; print flagged lines and store nothing.
    #[arg(long)]
    scan_only: bool,

    /// Run fully but keep the output in memory and print it instead of storing it.
    #[arg(long, conflicts_with = "scan_only")]
    dry_run: bool,

    /// Print `{"statusCode", "body"}` instead of the full run result.
    #[arg(long)]
    lambda: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PII_REDACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PII_REDACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PII_REDACT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ModeArg {
    Structured,
    Serialized,
}

impl From<ModeArg> for RedactionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Structured => RedactionMode::Structured,
            ModeArg::Serialized => RedactionMode::Serialized,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ScopeArg {
    Line,
    Entity,
}

impl From<ScopeArg> for MaskScope {
    fn from(v: ScopeArg) -> Self {
        match v {
            ScopeArg::Line => MaskScope::Line,
            ScopeArg::Entity => MaskScope::Entity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Cancellation on Ctrl-C ───────────────────────────────────────────
    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RedactionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb, token)?;

    let memory = Arc::new(MemoryObjectStore::new());
    let store: Arc<dyn ObjectStore> = if cli.dry_run {
        memory.clone()
    } else {
        Arc::new(LocalObjectStore::new(&cli.store_root))
    };
    let services = Services::new(
        store,
        Arc::new(
            HttpTextExtraction::new(&cli.extraction_url, config.api_timeout_secs)
                .context("Failed to create extraction client")?,
        ),
        Arc::new(
            HttpEntityDetection::new(&cli.detection_url, config.api_timeout_secs)
                .context("Failed to create detection client")?,
        ),
    );

    let event = load_event(&cli)?;

    // ── Scan-only mode ───────────────────────────────────────────────────
    if cli.scan_only {
        let doc = pii_redactor::pipeline::trigger::parse_notification(&event)?;
        let lines = scan_document(&doc, &services, &config)
            .await
            .context("Scan failed")?;
        let report: Vec<Value> = lines
            .iter()
            .filter(|l| l.is_flagged())
            .map(|l| {
                json!({
                    "block_index": l.block_index,
                    "text": l.text(),
                    "entities": l.entities,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    // ── Full run ─────────────────────────────────────────────────────────
    let result = run(&event, &services, &config).await;

    if cli.dry_run {
        if let Some(ref key) = result.output_key {
            let doc = pii_redactor::pipeline::trigger::parse_notification(&event)?;
            if let Some(body) = memory.object_string(&doc.bucket, key) {
                println!("{body}");
            }
        }
    }

    let rendered = if cli.lambda {
        serde_json::to_string_pretty(&result.to_lambda_response())
    } else {
        serde_json::to_string_pretty(&result)
    }
    .context("Failed to serialise run result")?;
    println!("{rendered}");

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Read the notification, or synthesise one from `--bucket`/`--key`.
fn load_event(cli: &Cli) -> Result<Value> {
    if let (Some(bucket), Some(key)) = (&cli.bucket, &cli.key) {
        return Ok(json!({
            "Records": [{
                "s3": {
                    "bucket": {"name": bucket},
                    "object": {"key": urlencoding::encode(key)},
                }
            }]
        }));
    }

    let raw = match cli.event.as_deref() {
        Some(p) if p.as_os_str() == "-" => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read notification from stdin")?;
            buf
        }
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read notification from {:?}", p))?,
        None => bail!("pass a notification file or --bucket and --key"),
    };
    serde_json::from_str(&raw).context("Notification is not valid JSON")
}

/// Map CLI args to `RedactionConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    token: CancellationToken,
) -> Result<RedactionConfig> {
    let deadline = (cli.poll_deadline > 0).then_some(cli.poll_deadline);

    let mut builder = RedactionConfig::builder()
        .poll_interval_ms(cli.poll_interval_ms)
        .max_poll_attempts(cli.max_polls)
        .poll_deadline_secs(deadline)
        .language_code(&cli.language)
        .mask_char(cli.mask_char)
        .redaction_mode(cli.mode.clone().into())
        .mask_scope(cli.scope.clone().into())
        .detection_concurrency(cli.concurrency)
        .output_prefix(&cli.output_prefix)
        .pretty_output(cli.pretty)
        .api_timeout_secs(cli.api_timeout)
        .cancellation(token);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
