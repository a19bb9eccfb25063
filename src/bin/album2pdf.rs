//! CLI binary for album2pdf.
//!
//! A thin shim over the library crate: maps CLI flags to `DownloaderConfig`,
//! drains the batch event stream into a progress bar and status log, and
//! answers the overwrite prompt on the terminal.

use album2pdf::{
    AlwaysOverwrite, BatchController, BatchEvent, BatchSummary, DownloaderConfig, HttpAlbumSource,
    NeverOverwrite, OverwritePrompt, RecordStore,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

// ── Status log + progress bar ────────────────────────────────────────────────

/// Renders batch events: one status line per event plus a bar bounded by
/// the batch size.
struct Reporter {
    bar: ProgressBar,
    show_progress: bool,
    quiet: bool,
}

impl Reporter {
    fn new(show_progress: bool, quiet: bool) -> Self {
        let bar = if show_progress {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(TICKS),
            );
            bar.set_prefix("Preparing");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            show_progress,
            quiet,
        }
    }

    /// Switch to the full bar once the batch size is known.
    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} albums  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Downloading");
    }

    fn line(&self, text: String) {
        if self.quiet {
            return;
        }
        if self.show_progress {
            self.bar.println(text);
        } else {
            eprintln!("{text}");
        }
    }

    fn handle(&self, event: &BatchEvent) {
        match event {
            BatchEvent::NoInput => self.line(format!("{} {}", red("✘"), event)),
            BatchEvent::Started { total } => {
                self.activate_bar(*total);
                self.line(format!("{} {}", cyan("◆"), bold(&event.to_string())));
            }
            BatchEvent::ItemStarted { id, .. } => {
                self.bar.set_message(id.clone());
                self.line(format!("\n{}", bold(&event.to_string())));
            }
            BatchEvent::TitleResolved { .. } => self.line(format!("  {}", event)),
            BatchEvent::DuplicateSkipped { .. } => {
                self.line(format!("  {} {}", yellow("⏭"), event))
            }
            BatchEvent::ItemSucceeded { .. } => self.line(format!("  {} {}", green("✓"), event)),
            BatchEvent::ItemFailed { .. } => self.line(format!("  {} {}", red("✗"), red(&event.to_string()))),
            BatchEvent::RecordNotSaved { .. } => self.line(format!("  {} {}", yellow("⚠"), event)),
            BatchEvent::ScratchCleaned { .. } => self.line(format!("  {}", dim(&event.to_string()))),
            BatchEvent::ScratchCleanupFailed { .. } => {
                self.line(format!("  {} {}", yellow("⚠"), event))
            }
            BatchEvent::Progress { value, max } => {
                self.bar.set_length(*max as u64);
                self.bar.set_position(*value as u64);
            }
            BatchEvent::Finished(summary) => {
                self.bar.finish_and_clear();
                self.finish_line(summary);
            }
        }
    }

    fn finish_line(&self, summary: &BatchSummary) {
        let mark = if summary.failed == 0 {
            green("✔")
        } else if summary.failed == summary.total {
            red("✘")
        } else {
            cyan("⚠")
        };
        let text = format!(
            "{} {} saved, {} skipped, {} failed",
            mark,
            bold(&summary.succeeded.to_string()),
            summary.skipped,
            if summary.failed == 0 {
                summary.failed.to_string()
            } else {
                red(&summary.failed.to_string())
            },
        );
        if !self.quiet {
            eprintln!("\n{text}");
        }
    }
}

// ── Overwrite prompt ─────────────────────────────────────────────────────────

/// Interactive y/N question on the terminal; the progress bar is suspended
/// while waiting for the answer.
struct TerminalPrompt {
    bar: ProgressBar,
}

#[async_trait]
impl OverwritePrompt for TerminalPrompt {
    async fn confirm_overwrite(&self, id: &str, existing_title: &str) -> bool {
        let bar = self.bar.clone();
        let question = format!(
            "{} Album \"{}\" (ID {}) was already downloaded. Download again? [y/N] ",
            yellow("?"),
            existing_title,
            id
        );
        tokio::task::spawn_blocking(move || bar.suspend(|| ask_yes_no(&question)))
            .await
            .unwrap_or(false)
    }
}

fn ask_yes_no(question: &str) -> bool {
    eprint!("{question}");
    io::stderr().flush().ok();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

// ── CLI ──────────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Download two albums
  album2pdf --api-base https://gallery.example.com/api 1198446 1198447

  # IDs from a file (one per line), re-download without asking
  album2pdf -f ids.txt --yes

  # IDs from a pipe; already-downloaded albums are skipped
  cat ids.txt | album2pdf

  # Show what has been downloaded so far
  album2pdf --list-records

CONTENT SERVICE:
  GET {api-base}/album/{id} must return
    {"title": "...", "images": ["<absolute URL or path relative to api-base>", ...]}
  Images are fetched in order, normalised to JPEG and stitched into
  {output-dir}/{title}.pdf.

ENVIRONMENT VARIABLES:
  ALBUM2PDF_API_BASE      Content service base URL
  ALBUM2PDF_OUTPUT_DIR    Output directory for PDFs and the record file
  ALBUM2PDF_PDFIUM_LIB    Path to libpdfium (file or directory)
  RUST_LOG                Override log filter (e.g. album2pdf=debug)
"#;

/// Download image albums and turn each one into a PDF.
#[derive(Parser, Debug)]
#[command(
    name = "album2pdf",
    version,
    about = "Download image albums and assemble each one into a PDF",
    long_about = "Download paginated image albums from a content service, assemble every album \
into a single PDF, and keep a record of finished albums so they are not downloaded twice.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Album IDs. Falls back to --file, then to piped stdin.
    ids: Vec<String>,

    /// Read album IDs from this file (whitespace or newline separated).
    #[arg(short, long, env = "ALBUM2PDF_ID_FILE")]
    file: Option<PathBuf>,

    /// Directory for finished PDFs.
    #[arg(short, long, env = "ALBUM2PDF_OUTPUT_DIR", default_value = "albums")]
    output_dir: PathBuf,

    /// Scratch directory for page images [default: <output-dir>/temp_images].
    #[arg(long, env = "ALBUM2PDF_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Download record file [default: <output-dir>/downloaded_records.json].
    #[arg(long, env = "ALBUM2PDF_RECORD_FILE")]
    record_file: Option<PathBuf>,

    /// Content service base URL.
    #[arg(long, env = "ALBUM2PDF_API_BASE")]
    api_base: Option<String>,

    /// Re-download albums that are already recorded, without asking.
    #[arg(short, long, conflicts_with = "skip_existing")]
    yes: bool,

    /// Skip albums that are already recorded, without asking.
    #[arg(long)]
    skip_existing: bool,

    /// Concurrent page-image downloads per album.
    #[arg(short, long, env = "ALBUM2PDF_CONCURRENCY", default_value_t = 20)]
    concurrency: usize,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "ALBUM2PDF_TIMEOUT", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Attempts for resetting the scratch directory.
    #[arg(long, env = "ALBUM2PDF_CLEANUP_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    cleanup_attempts: u32,

    /// Pause between scratch-reset attempts in milliseconds.
    #[arg(long, env = "ALBUM2PDF_CLEANUP_BACKOFF_MS", default_value_t = 1000)]
    cleanup_backoff_ms: u64,

    /// Path to libpdfium (file or directory containing it).
    #[arg(long, env = "ALBUM2PDF_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Print the download records and exit.
    #[arg(long)]
    list_records: bool,

    /// Machine-readable output (records listing or batch summary) on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ALBUM2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ALBUM2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ALBUM2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar and status log carry the user-facing output; library
    // INFO logs would only duplicate them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.list_records;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    // ── Records listing ──────────────────────────────────────────────────
    if cli.list_records {
        return list_records(&config, cli.json);
    }

    // ── Collect IDs ──────────────────────────────────────────────────────
    let (raw_ids, ids_from_stdin) = read_ids(&cli).await?;

    config
        .ensure_dirs()
        .await
        .context("Failed to prepare output directories")?;

    let records = Arc::new(RecordStore::open(config.record_file()));
    let source = Arc::new(HttpAlbumSource::new(&config).context("Invalid configuration")?);

    let reporter = Reporter::new(show_progress, cli.quiet);
    let interactive = !ids_from_stdin && io::stdin().is_terminal();
    let prompt: Arc<dyn OverwritePrompt> = if cli.yes {
        Arc::new(AlwaysOverwrite)
    } else if cli.skip_existing || !interactive {
        Arc::new(NeverOverwrite)
    } else {
        Arc::new(TerminalPrompt {
            bar: reporter.bar.clone(),
        })
    };

    // ── Run batch ────────────────────────────────────────────────────────
    let controller = Arc::new(BatchController::new(config, records, source, prompt));
    let mut batch = controller.spawn(raw_ids);

    while let Some(event) = batch.events().next().await {
        reporter.handle(&event);
    }

    let summary = batch.wait().await.context("Batch did not run")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    }

    if summary.failed > 0 {
        anyhow::bail!(
            "{}/{} albums failed: {}",
            summary.failed,
            summary.total,
            summary.failed_ids().join(", ")
        );
    }
    Ok(())
}

/// Map CLI args to `DownloaderConfig`.
fn build_config(cli: &Cli) -> Result<DownloaderConfig> {
    let mut builder = DownloaderConfig::builder()
        .output_dir(&cli.output_dir)
        .image_concurrency(cli.concurrency)
        .request_timeout_secs(cli.timeout)
        .cleanup_attempts(cli.cleanup_attempts)
        .cleanup_backoff_ms(cli.cleanup_backoff_ms);

    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(ref path) = cli.record_file {
        builder = builder.record_file(path);
    }
    if let Some(ref url) = cli.api_base {
        builder = builder.api_base(url);
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path);
    }

    builder.build().context("Invalid configuration")
}

/// Gather raw ID text from args, `--file`, or piped stdin.
/// The flag reports whether stdin was consumed.
async fn read_ids(cli: &Cli) -> Result<(String, bool)> {
    if !cli.ids.is_empty() {
        return Ok((cli.ids.join("\n"), false));
    }
    if let Some(ref path) = cli.file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read album IDs from {:?}", path))?;
        return Ok((text, false));
    }
    if !io::stdin().is_terminal() {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read album IDs from stdin")?;
        return Ok((text, true));
    }
    Ok((String::new(), false))
}

/// Print every record: ID, title, download time.
fn list_records(config: &DownloaderConfig, json: bool) -> Result<()> {
    let store = RecordStore::open(config.record_file());

    if json {
        let map: std::collections::BTreeMap<_, _> = store.records().into_iter().collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&map).context("Failed to serialise records")?
        );
        return Ok(());
    }

    if store.is_empty() {
        println!("No download records yet.");
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (id, record) in store.records() {
        writeln!(out, "ID:            {}", id)?;
        writeln!(out, "Title:         {}", record.title)?;
        writeln!(out, "Downloaded at: {}", record.completed_at)?;
        writeln!(out, "{}", "-".repeat(50))?;
    }
    writeln!(out, "{} albums", store.len())?;
    Ok(())
}
