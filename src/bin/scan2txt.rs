//! CLI binary for scan2txt.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one document, and prints the transcript and its
//! locator.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scan2txt::{
    Capabilities, Locator, Pipeline, PipelineConfig, PipelineProgressCallback, ProbeOptions,
    ProgressCallback, ResultStore, SubmittedDocument, ThresholdPolicy,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page.
/// Pages may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Recognising {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_enhancement_fallback(&self, page_num: usize, reason: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}  {}",
            yellow("~"),
            page_num,
            dim(&format!("enhancement skipped: {reason}")),
        ));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        let elapsed = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep one line per page.
        let msg: String = if error.chars().count() > 80 {
            let mut short: String = error.chars().take(79).collect();
            short.push('…');
            short
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, recognized: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {}/{} pages with text",
                green("✔"),
                bold(&recognized.to_string()),
                total_pages
            );
        } else {
            eprintln!(
                "{} {}/{} pages with text  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&recognized.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recognise a photo, print the text
  scan2txt receipt.jpg

  # Multi-page PDF in German, with enhancement
  scan2txt --lang deu --enhance contract.pdf

  # Several languages, single-column layout
  scan2txt --lang eng+fra --psm 4 letter.png

  # Global threshold instead of adaptive for clean flatbed scans
  scan2txt --enhance --threshold otsu scan.tiff

  # JSON transcript (pages, stats, locator)
  scan2txt --json invoice.pdf > invoice.json

  # Show which optional components were found
  scan2txt --check

  # Print a transcript saved by an earlier run
  scan2txt --fetch invoice_20240501_101500_123456_1a2b3c4d.txt

ENVIRONMENT VARIABLES:
  TESSERACT_PATH      Path to the tesseract executable (default: search PATH)
  TESSDATA_PREFIX     Directory holding *.traineddata (read by tesseract)
  PDFIUM_LIB_PATH     Path to libpdfium for PDF input
  SCAN2TXT_*          Defaults for most flags (see --help)
  RUST_LOG            Log filter override, e.g. scan2txt=debug
"#;

/// Recognise text in scanned images and PDFs with tesseract.
#[derive(Parser, Debug)]
#[command(
    name = "scan2txt",
    version,
    about = "Recognise text in scanned images and PDFs with tesseract",
    long_about = "Convert scanned documents (png, jpg, jpeg, tif, tiff, bmp, gif, pdf) to plain \
text. PDF pages are rasterised with pdfium, optionally cleaned up (grayscale, denoise, \
binarise, despeckle, upscale), recognised with tesseract, and saved under a unique name.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image or PDF to recognise.
    #[arg(required_unless_present_any = ["check", "fetch"])]
    input: Option<PathBuf>,

    /// Recognition language(s), e.g. eng, deu, eng+fra.
    #[arg(short, long, env = "SCAN2TXT_LANG", default_value = "eng")]
    lang: String,

    /// Clean pages up before recognition.
    #[arg(short, long, env = "SCAN2TXT_ENHANCE")]
    enhance: bool,

    /// PDF rasterisation DPI (72–600).
    #[arg(long, env = "SCAN2TXT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Tesseract page segmentation mode (0–13).
    #[arg(long, env = "SCAN2TXT_PSM", value_parser = clap::value_parser!(u8).range(0..=13))]
    psm: Option<u8>,

    /// Tesseract OCR engine mode (0–3).
    #[arg(long, env = "SCAN2TXT_OEM", value_parser = clap::value_parser!(u8).range(0..=3))]
    oem: Option<u8>,

    /// Binarisation method used by --enhance.
    #[arg(long, env = "SCAN2TXT_THRESHOLD", value_enum, default_value = "adaptive")]
    threshold: ThresholdArg,

    /// Directory transcripts are saved to.
    #[arg(short, long, env = "SCAN2TXT_OUT_DIR", default_value = "outputs")]
    out_dir: PathBuf,

    /// Pages recognised at once.
    #[arg(short, long, env = "SCAN2TXT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-page recognition timeout in seconds.
    #[arg(long, env = "SCAN2TXT_PAGE_TIMEOUT", default_value_t = 60)]
    page_timeout: u64,

    /// Largest accepted input in MiB.
    #[arg(long, env = "SCAN2TXT_MAX_MB", default_value_t = 16)]
    max_mb: u64,

    /// Output the full transcript as JSON instead of plain text.
    #[arg(long, env = "SCAN2TXT_JSON")]
    json: bool,

    /// Path to the tesseract executable.
    #[arg(long, env = "TESSERACT_PATH")]
    tesseract: Option<PathBuf>,

    /// Path to the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "SCAN2TXT_NO_PROGRESS")]
    no_progress: bool,

    /// Print the capability report and exit.
    #[arg(long, conflicts_with = "fetch")]
    check: bool,

    /// Print a previously saved transcript and exit.
    #[arg(long, value_name = "LOCATOR")]
    fetch: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCAN2TXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCAN2TXT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ThresholdArg {
    Adaptive,
    Otsu,
}

impl From<ThresholdArg> for ThresholdPolicy {
    fn from(v: ThresholdArg) -> Self {
        match v {
            ThresholdArg::Adaptive => ThresholdPolicy::default(),
            ThresholdArg::Otsu => ThresholdPolicy::Otsu,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.input.is_some();
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

    // ── Fetch mode ───────────────────────────────────────────────────────
    if let Some(ref raw) = cli.fetch {
        let store = ResultStore::open(&cli.out_dir)
            .await
            .context("Failed to open output directory")?;
        let locator = Locator::parse(raw).context("Invalid locator")?;
        let text = store.read(&locator).await.context("Fetch failed")?;
        write_stdout(&text)?;
        return Ok(());
    }

    // ── Capability probe ─────────────────────────────────────────────────
    let options = ProbeOptions {
        tesseract: cli.tesseract.clone(),
        pdfium: cli.pdfium.clone(),
    };
    let caps = tokio::task::spawn_blocking(move || Capabilities::init(&options))
        .await
        .context("Capability probe panicked")?;

    if cli.check {
        print_report(caps, cli.json)?;
        return Ok(());
    }

    let Some(ref input) = cli.input else {
        anyhow::bail!("No input file given");
    };

    // ── Build pipeline ───────────────────────────────────────────────────
    let store = ResultStore::open(&cli.out_dir)
        .await
        .context("Failed to open output directory")?;
    let pipeline = Pipeline::from_capabilities(caps, store).context("Cannot start pipeline")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let document = SubmittedDocument::from_path(input).context("Input rejected")?;

    // ── Run, cancelling on Ctrl-C ────────────────────────────────────────
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let transcript = pipeline
        .run_with_cancel(document, &config, cancel)
        .await
        .context("Recognition failed")?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&transcript).context("Failed to serialise transcript")?;
        println!("{json}");
    } else {
        write_stdout(&transcript.text)?;
    }

    if !cli.quiet && !cli.json {
        let stats = &transcript.stats;
        if !show_progress {
            eprintln!(
                "Recognised {}/{} pages in {}ms",
                stats.pages_with_text, stats.total_pages, stats.total_duration_ms
            );
            if stats.failed_pages > 0 {
                eprintln!("  {} pages failed", stats.failed_pages);
            }
        }
        if stats.enhancement_fallbacks > 0 {
            eprintln!(
                "   {} page(s) recognised without enhancement",
                yellow(&stats.enhancement_fallbacks.to_string())
            );
        }
        eprintln!(
            "   saved  →  {}",
            bold(&pipeline.store().root().join(transcript.locator.as_str()).display().to_string())
        );
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .language(cli.lang.clone())
        .enhance(cli.enhance)
        .dpi(cli.dpi)
        .threshold(cli.threshold.into())
        .concurrency(cli.concurrency)
        .page_timeout(Duration::from_secs(cli.page_timeout))
        .max_input_bytes(cli.max_mb.saturating_mul(1024 * 1024));

    if let Some(psm) = cli.psm {
        builder = builder.page_segmentation(psm);
    }
    if let Some(oem) = cli.oem {
        builder = builder.ocr_engine(oem);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_report(caps: &Capabilities, json: bool) -> Result<()> {
    let report = caps.report();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    let mark = |ok: bool| if ok { green("✓") } else { red("✗") };
    println!(
        "{} PDF renderer   {}",
        mark(report.pdf_renderer.available),
        report.pdf_renderer.detail
    );
    println!(
        "{} Enhancement    {}",
        mark(report.enhancement.available),
        report.enhancement.detail
    );
    println!(
        "{} OCR engine     {}",
        mark(report.engine.available),
        report.engine_version.as_deref().unwrap_or(&report.engine.detail)
    );
    if let Some(ref langs) = report.languages {
        println!("  Languages      {}", dim(&langs.join(", ")));
    }
    if !report.ready() {
        anyhow::bail!("Recognition engine unavailable");
    }
    Ok(())
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}
