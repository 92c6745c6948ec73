//! CLI command definitions, routing, and tracing setup.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bookbinder_core::registry::ChapterRegistry;
use bookbinder_core::{
    BuildOrchestrator, BuildReport, FormatOutcome, FormatStatus, ProcessRunner, ProgressReporter,
};
use bookbinder_shared::{
    BookConfig, BuildRequest, ChapterId, Format, Strictness, config_file_path, init_config,
    load_config,
};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bookbinder: build a book from its chapters.
#[derive(Parser)]
#[command(
    name = "bookbinder",
    version,
    about = "Build a multi-chapter book into PDF, EPUB, MOBI, and a static site.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to bookbinder.toml. Its directory is the project root.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build the requested formats.
    Build(BuildArgs),

    /// List the chapter catalog and whether each source exists.
    Chapters,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct BuildArgs {
    /// Chapters to build (defaults to the whole catalog).
    pub chapters: Vec<String>,

    /// Build the typeset PDF.
    #[arg(long)]
    pub pdf: bool,

    /// Build the EPUB e-book.
    #[arg(long)]
    pub epub: bool,

    /// Build the MOBI file from the e-book built in this run.
    #[arg(long)]
    pub mobi: bool,

    /// Build the static site.
    #[arg(long)]
    pub html: bool,

    /// Build every format.
    #[arg(long)]
    pub all_formats: bool,

    /// Run the converter to assemble the e-book, instead of only repackaging
    /// the existing one.
    #[arg(long)]
    pub assemble_ebook: bool,

    /// Stop a format at its first external tool failure.
    #[arg(long)]
    pub strict: bool,

    /// Also write the build report as JSON to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl BuildArgs {
    /// Requested formats; `--all-formats` selects every one.
    pub fn formats(&self) -> BTreeSet<Format> {
        if self.all_formats {
            return Format::ALL.into_iter().collect();
        }
        [
            (self.pdf, Format::Pdf),
            (self.epub, Format::Epub),
            (self.mobi, Format::Mobi),
            (self.html, Format::Html),
        ]
        .into_iter()
        .filter_map(|(on, format)| on.then_some(format))
        .collect()
    }

    /// Merge flags with the config file. `--strict` always wins.
    pub fn to_request(&self, config: &BookConfig) -> BuildRequest {
        let strictness = if self.strict || config.build.strict {
            Strictness::Strict
        } else {
            Strictness::BestEffort
        };
        BuildRequest {
            requested: self.chapters.iter().cloned().collect(),
            formats: self.formats(),
            assemble_ebook: self.assemble_ebook,
            strictness,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "bookbinder=info",
        1 => "bookbinder=debug",
        _ => "bookbinder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let (root, config_path) = resolve_project(cli.config.as_deref())?;
    match cli.command {
        Command::Build(args) => cmd_build(&root, &config_path, &args),
        Command::Chapters => cmd_chapters(&root, &config_path),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&config_path),
            ConfigAction::Show => cmd_config_show(&config_path),
        },
    }
}

/// Project root and config path. The root is the config file's directory,
/// or the current directory when no path is given.
fn resolve_project(config: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
    let cwd =
        std::env::current_dir().map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    Ok(match config {
        Some(path) => {
            let path = cwd.join(path);
            let root = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.clone());
            (root, path)
        }
        None => (cwd.clone(), config_file_path(&cwd)),
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_build(root: &Path, config_path: &Path, args: &BuildArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let request = args.to_request(&config);

    if request.formats.is_empty() {
        warn!("no format requested, only the master document will be assembled");
    }

    info!(
        root = %root.display(),
        chapters = request.requested.len(),
        formats = request.formats.len(),
        strict = matches!(request.strictness, Strictness::Strict),
        "building book"
    );

    let runner = ProcessRunner;
    let reporter = CliProgress::new();
    let report = BuildOrchestrator::new(&config, root, &runner).build(&request, &reporter)?;

    print_summary(&report);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .map_err(|e| eyre!("cannot write report to {}: {e}", path.display()))?;
        println!("  Report: {}", path.display());
    }

    let failed = report
        .formats
        .iter()
        .filter(|f| f.status == FormatStatus::Failed)
        .count();
    if failed > 0 {
        return Err(eyre!("{failed} format(s) failed"));
    }
    Ok(())
}

fn print_summary(report: &BuildReport) {
    println!();
    println!("  Build {}", report.build_id);
    println!(
        "  Chapters: {} built, {} missing, {} unknown",
        report.selected.len(),
        report.missing.len(),
        report.unknown.len()
    );
    for id in &report.missing {
        println!("    skipped {id} (no source file)");
    }
    for id in &report.unknown {
        println!("    ignored {id} (not in catalog)");
    }
    for outcome in &report.formats {
        println!("  {}", outcome_line(outcome));
    }
    println!("  Time: {:.1}s", report.elapsed_ms as f64 / 1000.0);
    println!();
}

fn outcome_line(outcome: &FormatOutcome) -> String {
    let status = match outcome.status {
        FormatStatus::Succeeded => "ok",
        FormatStatus::Degraded => "degraded",
        FormatStatus::Failed => "FAILED",
    };
    let detail = match (&outcome.artifact, &outcome.error) {
        (_, Some(error)) => error.clone(),
        (Some(artifact), None) => artifact.path.display().to_string(),
        (None, None) => "no artifact produced".to_string(),
    };
    let failures = if outcome.failures.is_empty() {
        String::new()
    } else {
        format!(" ({} tool failures)", outcome.failures.len())
    };
    format!("{:<5} {status:<8} {detail}{failures}", outcome.format.as_str())
}

fn cmd_chapters(root: &Path, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = ChapterRegistry::new(
        &config.chapters.catalog,
        root,
        &config.book.source_extension,
    )?;
    let assets: BTreeSet<&ChapterId> = config.chapters.assets.iter().collect();

    for (i, chapter) in registry.chapters().iter().enumerate() {
        let source = if chapter.exists { "ok" } else { "missing" };
        let images = if assets.contains(&chapter.id) { "images" } else { "" };
        println!(
            "{:>3}  {:<16} {:<8} {images}",
            i + 1,
            chapter.id.as_str(),
            source
        );
    }
    Ok(())
}

fn cmd_config_init(config_path: &Path) -> Result<()> {
    init_config(config_path)?;
    println!("Config initialized at: {}", config_path.display());
    Ok(())
}

fn cmd_config_show(config_path: &Path) -> Result<()> {
    let config: BookConfig = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn chapter(&self, format: Format, id: &ChapterId, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Building {format} [{current}/{total}] {id}"));
    }

    fn format_done(&self, outcome: &FormatOutcome) {
        self.spinner.println(outcome_line(outcome));
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}
