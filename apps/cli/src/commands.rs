//! CLI command definitions, routing, and tracing setup.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use reportkit_core::{CancelFlag, ImportReport, ImportRequest, ProgressReporter, run_import};
use reportkit_markup::{Sanitized, sanitize, sanitize_html, text_to_markup};
use reportkit_shared::{
    AppConfig, DuplicateMode, ImportConfig, ReportKitError, ReportStore, expand_home, init_config,
    load_config,
};
use reportkit_storage::{MemoryStore, Storage};
use reportkit_tabular::TabularKind;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ReportKit: import report spreadsheets as clean, safe records.
#[derive(Parser)]
#[command(
    name = "reportkit",
    version,
    about = "Import report spreadsheets, normalizing rich text into sanitized markup.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Input file kind, when the extension does not tell.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum KindArg {
    Delimited,
    Workbook,
}

impl From<KindArg> for TabularKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Delimited => TabularKind::Delimited,
            KindArg::Workbook => TabularKind::Workbook,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import a spreadsheet of reports.
    Import {
        /// CSV/TSV or workbook file.
        file: PathBuf,

        /// Duplicate handling: update, skip or create (defaults to config).
        #[arg(short, long)]
        mode: Option<String>,

        /// File kind (inferred from the extension by default).
        #[arg(long)]
        kind: Option<KindArg>,

        /// Database path (defaults to config).
        #[arg(long, env = "REPORTKIT_DB")]
        db: Option<PathBuf>,

        /// Normalize without writing; duplicates are only detected within the file.
        #[arg(long)]
        dry_run: bool,

        /// Worker pool size (defaults to config).
        #[arg(long)]
        concurrency: Option<u32>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write the import template CSV.
    Template {
        /// Output file (stdout when omitted).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Sanitize HTML from a file or stdin.
    Sanitize {
        /// Input file (stdin when omitted).
        file: Option<PathBuf>,
    },

    /// Convert plain text from a file or stdin into sanitized markup.
    Convert {
        /// Input file (stdin when omitted).
        file: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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

/// Initialize tracing based on CLI flags. Logs go to stderr so that command
/// output on stdout stays machine-readable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "reportkit=info",
        1 => "reportkit=debug",
        _ => "reportkit=trace",
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
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Import {
            file,
            mode,
            kind,
            db,
            dry_run,
            concurrency,
            json,
        } => {
            let options = ImportOptions {
                mode,
                kind,
                db,
                dry_run,
                concurrency,
                json,
            };
            cmd_import(&file, options).await
        }
        Command::Template { out } => cmd_template(out.as_deref()),
        Command::Sanitize { file } => cmd_sanitize(file.as_deref()),
        Command::Convert { file } => cmd_convert(file.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

struct ImportOptions {
    mode: Option<String>,
    kind: Option<KindArg>,
    db: Option<PathBuf>,
    dry_run: bool,
    concurrency: Option<u32>,
    json: bool,
}

async fn cmd_import(file: &Path, options: ImportOptions) -> Result<()> {
    let config = load_config()?;

    let mode = match options.mode.as_deref() {
        Some(raw) => raw.parse::<DuplicateMode>()?,
        None => config.import.duplicate_mode,
    };
    let kind = match options.kind {
        Some(kind) => kind.into(),
        None => TabularKind::from_file_name(&file.to_string_lossy()).ok_or_else(|| {
            eyre!(
                "cannot tell the kind of '{}' from its extension; pass --kind",
                file.display()
            )
        })?,
    };

    let mut import_config = ImportConfig::from(&config);
    if let Some(n) = options.concurrency {
        import_config.concurrency = n.max(1) as usize;
    }

    let bytes = std::fs::read(file).map_err(|e| ReportKitError::io(file, e))?;

    let store: Arc<dyn ReportStore> = if options.dry_run {
        Arc::new(MemoryStore::new())
    } else {
        let path = match options.db {
            Some(path) => path,
            None => expand_home(&config.storage.database_path)?,
        };
        info!(db = %path.display(), "opening report database");
        Arc::new(Storage::open(&path).await?)
    };

    // Ctrl-C stops scheduling; rows already in flight still finish.
    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing rows in flight");
            on_interrupt.cancel();
        }
    });

    info!(
        file = %file.display(),
        ?kind,
        %mode,
        dry_run = options.dry_run,
        "importing reports"
    );

    let request = ImportRequest {
        bytes,
        kind,
        mode,
        config: import_config,
    };
    let reporter = CliProgress::new(!options.json);
    let report = run_import(request, store, &reporter, &cancel).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, options.dry_run);
    }
    Ok(())
}

fn print_report(report: &ImportReport, dry_run: bool) {
    let stats = &report.stats;

    println!();
    if stats.cancelled {
        println!("  Import cancelled; rows below were processed before stopping.");
    } else if dry_run {
        println!("  Dry run complete (nothing written).");
    } else {
        println!("  Import complete!");
    }
    println!("  Total:     {}", stats.total);
    println!("  Inserted:  {}", stats.inserted);
    println!("  Updated:   {}", stats.updated);
    println!("  Skipped:   {}", stats.skipped);
    println!("  Failed:    {}", stats.failed);
    println!("  Time:      {:.1}s", stats.elapsed.as_secs_f64());

    for (entity, count) in &report.lookups {
        println!("  New {entity}: {count}");
    }
    if !report.unmapped_headers.is_empty() {
        println!("  Ignored columns: {}", report.unmapped_headers.join(", "));
    }

    if !report.failures.is_empty() {
        println!();
        println!("  Failures:");
        for failure in &report.failures {
            println!("    row {:>5}  [{}] {}", failure.row, failure.kind, failure.detail);
        }
        let hidden = stats.failed.saturating_sub(report.failures.len());
        if hidden > 0 {
            println!("    ... and {hidden} more");
        }
    }

    if !report.warnings.is_empty() {
        println!();
        println!("  Warnings:");
        for warning in &report.warnings {
            println!("    row {:>5}  {}: {}", warning.row, warning.field, warning.detail);
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }

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

    fn row_done(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Saving reports [{current}/{total}]"));
    }

    fn done(&self, _report: &ImportReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// template / sanitize / convert
// ---------------------------------------------------------------------------

fn cmd_template(out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|e| ReportKitError::io(path, e))?;
            reportkit_core::write_template(file)?;
            println!("Template written to: {}", path.display());
        }
        None => reportkit_core::write_template(std::io::stdout().lock())?,
    }
    Ok(())
}

fn cmd_sanitize(file: Option<&Path>) -> Result<()> {
    let input = read_input(file)?;
    print_markup(sanitize_html(&input))
}

fn cmd_convert(file: Option<&Path>) -> Result<()> {
    let input = read_input(file)?;
    print_markup(sanitize(text_to_markup(&input)))
}

fn print_markup(sanitized: Sanitized) -> Result<()> {
    if let Some(anomaly) = &sanitized.anomaly {
        warn!(%anomaly, "markup reduced to plain text");
    }
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", sanitized.html)?;
    Ok(())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path).map_err(|e| ReportKitError::io(path, e))?),
        None => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            Ok(input)
        }
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
