//! CLI binary for edgequake-docprep.
//!
//! A thin shim over the library crate: one subcommand per preparation step,
//! flags mapped onto the library's config types, results printed to stdout.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_docprep::pipeline::chunk::prepare_chunks_from_file;
use edgequake_docprep::pipeline::entity::extract_entity_name_from_file;
use edgequake_docprep::{
    extract_blocks, filter_markdown_dir, filter_markdown_file, reconcile_signals_file,
    render_block_context, split_document, ChunkConfig, EntityMarkers, FilterRules, IngestConfig,
    IngestProgressCallback, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Label shown while pages are processed ("Splitting", "Extracting").
    verb: &'static str,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// A spinner until `on_ingest_start` reports the page count.
    fn new_dynamic(verb: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            verb,
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
        self.bar.set_prefix(self.verb);
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        let started = match self.start_times.lock() {
            Ok(mut times) => times.remove(&page_num),
            Err(_) => None,
        };
        started.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_ingest_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{} {total_pages} pages…", self.verb))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, detail: &str) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(detail),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep long messages on one line.
        let msg = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_ingest_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages processed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages processed  ({} with errors)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Split two-up scans into single pages
  docprep split scan.pdf -o scan.split.pdf

  # Export page PNGs and reconciled text/table blocks
  docprep blocks scan.split.pdf -o out/

  # Reconcile signals produced by another extractor
  docprep reconcile signals.json --context

  # Filter a directory of converted markdown
  docprep filter md/ -o filtered/ --rules rules.json --banned-header 目次

  # Extract organisation names
  docprep entity filtered/*.md

  # Prepare retrieval chunks as JSON
  docprep chunk filtered/report.md --json

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH     Path to libpdfium (file or directory)
  RUST_LOG            Override log filter (e.g. edgequake_docprep=debug)
  DOCPREP_*           Fallbacks for most flags (see --help of each subcommand)
"#;

/// Prepare scanned PDF reports for retrieval.
#[derive(Parser, Debug)]
#[command(
    name = "docprep",
    version,
    about = "Prepare scanned PDF reports for retrieval",
    long_about = "Split two-up scans, export reconciled page blocks, filter converted markdown, \
extract organisation names and prepare retrieval chunks.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCPREP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCPREP_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "DOCPREP_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct PdfArgs {
    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCPREP_PASSWORD")]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split pages that hold two half-pages into separate pages.
    Split {
        /// Input PDF.
        input: PathBuf,

        /// Output PDF.
        #[arg(short, long, env = "DOCPREP_OUTPUT")]
        output: PathBuf,

        /// Render scale for split analysis (1.0 = 72 DPI).
        #[arg(long, env = "DOCPREP_ANALYSIS_SCALE", default_value_t = 1.0)]
        analysis_scale: f32,

        /// Print the split report as JSON.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        pdf: PdfArgs,
    },

    /// Export page images and reconciled content blocks.
    Blocks {
        /// Input PDF.
        input: PathBuf,

        /// Output directory for page_NNN.png and blocks.json.
        #[arg(short, long, env = "DOCPREP_OUTPUT")]
        output: PathBuf,

        /// Page image DPI (72–600).
        #[arg(long, env = "DOCPREP_DPI", default_value_t = 300,
              value_parser = clap::value_parser!(u32).range(72..=600))]
        dpi: u32,

        #[command(flatten)]
        pdf: PdfArgs,
    },

    /// Reconcile a JSON array of per-page extraction signals.
    Reconcile {
        /// JSON file: an array of page signals.
        input: PathBuf,

        /// Write the block lists here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the plain-text block context of each page instead of JSON.
        #[arg(long)]
        context: bool,
    },

    /// Remove banned lines and sections from markdown files.
    Filter {
        /// A markdown file or a directory of *.md files.
        input: PathBuf,

        /// Output directory.
        #[arg(short, long, env = "DOCPREP_OUTPUT")]
        output: PathBuf,

        /// JSON rules file with banned_line_words / banned_header_keywords.
        #[arg(long, env = "DOCPREP_RULES")]
        rules: Option<PathBuf>,

        /// Drop lines containing this word (repeatable).
        #[arg(long = "banned-word", value_name = "WORD")]
        banned_words: Vec<String>,

        /// Drop sections whose header contains this keyword (repeatable).
        #[arg(long = "banned-header", value_name = "KEYWORD")]
        banned_headers: Vec<String>,
    },

    /// Print the organisation name found in each markdown file.
    Entity {
        /// Markdown files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// JSON file overriding the marker phrases.
        #[arg(long, env = "DOCPREP_MARKERS")]
        markers: Option<PathBuf>,
    },

    /// Split a markdown file into cleaned retrieval chunks.
    Chunk {
        /// Markdown file.
        input: PathBuf,

        /// Maximum chunk length in characters.
        #[arg(long, env = "DOCPREP_CHUNK_SIZE", default_value_t = 512)]
        chunk_size: usize,

        /// Characters of overlap between consecutive chunks.
        #[arg(long, env = "DOCPREP_CHUNK_OVERLAP", default_value_t = 32)]
        chunk_overlap: usize,

        /// Print chunks as a JSON array.
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    /// Whether this subcommand walks PDF pages and can show a progress bar.
    fn is_paged(&self) -> bool {
        matches!(self, Command::Split { .. } | Command::Blocks { .. })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would interleave with the progress bar, so they are muted
    // while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && cli.command.is_paged();
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
        Command::Split {
            ref input,
            ref output,
            analysis_scale,
            json,
            ref pdf,
        } => {
            let progress = progress_callback(show_progress, "Splitting");
            let config = ingest_config(pdf, progress, |b| b.analysis_scale(analysis_scale))?;
            let report = split_document(input, output, &config)
                .await
                .context("Split failed")?;

            if json {
                print_json(&report)?;
            } else if !cli.quiet {
                eprintln!(
                    "{}  {} of {} pages split  →  {} pages  →  {}",
                    green("✔"),
                    report.split_pages(),
                    report.input_pages,
                    report.output_pages,
                    bold(&report.output.display().to_string()),
                );
            }
        }

        Command::Blocks {
            ref input,
            ref output,
            dpi,
            ref pdf,
        } => {
            let progress = progress_callback(show_progress, "Extracting");
            let config = ingest_config(pdf, progress, |b| b.image_dpi(dpi))?;
            let result = extract_blocks(input, output, &config)
                .await
                .context("Block export failed")?;

            if !cli.quiet {
                eprintln!(
                    "{}  {} pages  {} blocks  →  {}",
                    if result.failed_pages() == 0 {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    result.pages.len(),
                    result.total_blocks(),
                    bold(&result.blocks_file.display().to_string()),
                );
            }
        }

        Command::Reconcile {
            ref input,
            ref output,
            context,
        } => {
            let pages = reconcile_signals_file(input)
                .await
                .with_context(|| format!("Failed to reconcile {}", input.display()))?;

            let rendered = if context {
                pages
                    .iter()
                    .map(|blocks| render_block_context(blocks))
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                serde_json::to_string_pretty(&pages).context("Failed to serialise blocks")?
            };
            match output {
                Some(path) => tokio::fs::write(path, rendered.as_bytes())
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => write_stdout(&rendered)?,
            }
        }

        Command::Filter {
            ref input,
            ref output,
            ref rules,
            ref banned_words,
            ref banned_headers,
        } => {
            let mut filter_rules = match rules {
                Some(path) => FilterRules::from_json_file(path).context("Invalid rules file")?,
                None => FilterRules::default(),
            };
            filter_rules.extend(banned_words, banned_headers);

            if input.is_dir() {
                let summary = filter_markdown_dir(input, &filter_rules, output)
                    .await
                    .context("Filtering failed")?;
                if !cli.quiet {
                    for file in &summary {
                        eprintln!(
                            "  {} {}  {}",
                            green("✓"),
                            file.output.display(),
                            dim(&format!(
                                "{} → {} lines",
                                file.stats.lines_in, file.stats.lines_out
                            )),
                        );
                    }
                    eprintln!("{} {} files filtered", green("✔"), bold(&summary.len().to_string()));
                }
            } else {
                let written = filter_markdown_file(input, &filter_rules, output)
                    .await
                    .context("Filtering failed")?;
                if !cli.quiet {
                    eprintln!("{}  →  {}", green("✔"), bold(&written.display().to_string()));
                }
            }
        }

        Command::Entity {
            ref inputs,
            ref markers,
        } => {
            let markers = match markers {
                Some(path) => load_markers(path)?,
                None => EntityMarkers::default(),
            };
            let mut lines = String::new();
            for path in inputs {
                let name = extract_entity_name_from_file(path, &markers)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                lines.push_str(&format!("{}\t{}\n", path.display(), name));
            }
            write_stdout(&lines)?;
        }

        Command::Chunk {
            ref input,
            chunk_size,
            chunk_overlap,
            json,
        } => {
            let config =
                ChunkConfig::new(chunk_size, chunk_overlap).context("Invalid chunk settings")?;
            let chunks = prepare_chunks_from_file(input, &config)
                .await
                .with_context(|| format!("Failed to chunk {}", input.display()))?;

            if json {
                print_json(&chunks)?;
            } else {
                let body = chunks
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n---\n\n");
                write_stdout(&body)?;
            }
            if !cli.quiet {
                eprintln!("{} {} chunks", green("✔"), bold(&chunks.len().to_string()));
            }
        }
    }

    Ok(())
}

fn progress_callback(show: bool, verb: &'static str) -> Option<ProgressCallback> {
    show.then(|| CliProgressCallback::new_dynamic(verb) as Arc<dyn IngestProgressCallback>)
}

/// Map the shared PDF flags onto an `IngestConfig`.
fn ingest_config(
    pdf: &PdfArgs,
    progress: Option<ProgressCallback>,
    tweak: impl FnOnce(edgequake_docprep::IngestConfigBuilder) -> edgequake_docprep::IngestConfigBuilder,
) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder();
    if let Some(ref pwd) = pdf.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    tweak(builder).build().context("Invalid configuration")
}

fn load_markers(path: &Path) -> Result<EntityMarkers> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read markers from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid markers file {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    write_stdout(&json)
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
