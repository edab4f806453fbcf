//! CLI command definitions, routing, and tracing setup.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use schemacat_core::{
    CleanConfig, DocumentOutcome, GitClient, Phase, ProgressReporter, UpdateConfig,
    UpdateSummary, VersionControlClient, catalogue_status, clean_catalogue, run_update,
};
use schemacat_shared::{
    AppConfig, MergeStrategy, config_file_path, init_config, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// schemacat: keep a table catalogue in sync with its HTML documentation.
#[derive(Parser)]
#[command(
    name = "schemacat",
    version,
    about = "Extract table definitions from HTML documents into a deduplicated JSON catalogue.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also append plain-text logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Config file (defaults to ~/.schemacat/schemacat.toml).
    #[arg(long, global = true, env = "SCHEMACAT_CONFIG")]
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
    /// Reprocess changed documents and refresh the catalogue.
    Update(UpdateArgs),

    /// Remove duplicate records from an existing catalogue.
    Clean(CleanArgs),

    /// Show catalogue size and how many documents are pending.
    Status(StatusArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub(crate) struct UpdateArgs {
    /// Directory holding the HTML documents.
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Catalogue JSON file.
    #[arg(long)]
    pub catalogue: Option<PathBuf>,

    /// Directory for catalogue and document backups.
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Document digest store.
    #[arg(long)]
    pub hash_file: Option<PathBuf>,

    /// Duplicate resolution: latest, first, or merge.
    #[arg(long)]
    pub strategy: Option<MergeStrategy>,

    /// Documents processed in parallel.
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Reprocess every document even if unchanged.
    #[arg(short, long)]
    pub force: bool,

    /// Skip commit and push.
    #[arg(long)]
    pub no_git: bool,

    /// Commit message (defaults to a dated message).
    #[arg(short = 'm', long)]
    pub commit_message: Option<String>,

    /// Repository to commit in (defaults to the current directory).
    #[arg(long)]
    pub repo_dir: Option<PathBuf>,
}

#[derive(Args)]
pub(crate) struct CleanArgs {
    /// Catalogue JSON file.
    #[arg(long)]
    pub catalogue: Option<PathBuf>,

    /// Directory for the catalogue backup.
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Duplicate resolution: latest, first, or merge.
    #[arg(long)]
    pub strategy: Option<MergeStrategy>,

    /// Only report duplicates; do not rewrite the catalogue.
    #[arg(long)]
    pub analyze: bool,

    /// Also check every record for a table name and source file.
    #[arg(long)]
    pub validate: bool,
}

#[derive(Args)]
pub(crate) struct StatusArgs {
    /// Directory holding the HTML documents.
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Catalogue JSON file.
    #[arg(long)]
    pub catalogue: Option<PathBuf>,

    /// Document digest store.
    #[arg(long)]
    pub hash_file: Option<PathBuf>,
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
pub(crate) fn init_tracing(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match cli.verbose {
        0 => "schemacat=info",
        1 => "schemacat=debug",
        _ => "schemacat=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| eyre!("cannot open log file '{}': {e}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    match cli.log_format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Update(args) => cmd_update(&resolve_config(cli.config.as_deref())?, args).await,
        Command::Clean(args) => cmd_clean(&resolve_config(cli.config.as_deref())?, args),
        Command::Status(args) => cmd_status(&resolve_config(cli.config.as_deref())?, args),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        },
    }
}

/// Config file named on the command line, or the default one (or defaults).
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Flags override the config file.
fn update_config(app: &AppConfig, args: &UpdateArgs) -> Result<UpdateConfig> {
    let mut config = UpdateConfig::from(app);
    if let Some(dir) = &args.source_dir {
        config.source_dir = dir.clone();
    }
    if let Some(file) = &args.catalogue {
        config.catalogue_file = file.clone();
    }
    if let Some(dir) = &args.backup_dir {
        config.backup_dir = dir.clone();
    }
    if let Some(file) = &args.hash_file {
        config.hash_file = file.clone();
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            return Err(eyre!("--jobs must be at least 1"));
        }
        config.jobs = jobs;
    }
    config.force = args.force;
    config.commit_message = args.commit_message.clone();
    Ok(config)
}

async fn cmd_update(app: &AppConfig, args: UpdateArgs) -> Result<()> {
    let config = update_config(app, &args)?;

    let git = (app.vcs.enabled && !args.no_git).then(|| {
        let repo = args
            .repo_dir
            .clone()
            .or_else(|| app.vcs.repo_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        GitClient::new(repo)
    });

    info!(
        source = %config.source_dir.display(),
        catalogue = %config.catalogue_file.display(),
        strategy = %config.strategy,
        jobs = config.jobs,
        force = config.force,
        git = git.is_some(),
        "updating catalogue"
    );

    let reporter = CliProgress::new();
    let vcs = git.as_ref().map(|g| g as &dyn VersionControlClient);
    let summary = run_update(&config, &reporter, vcs).await?;

    print_update_summary(&summary);
    Ok(())
}

fn print_update_summary(summary: &UpdateSummary) {
    println!();
    println!("  Catalogue {}", if summary.persisted { "updated!" } else { "already up to date." });
    println!("  Documents:    {}", summary.documents);
    println!("  Updated:      {}", summary.updated);
    println!("  Converted:    {}", summary.converted);
    println!("  Unchanged:    {}", summary.unchanged);
    println!("  Failed:       {}", summary.failed());
    if summary.dedup_removed > 0 {
        println!("  Deduplicated: {}", summary.dedup_removed);
    }
    println!("  Tables:       {}", summary.tables);
    if let Some(vcs) = summary.vcs {
        println!("  Git:          {vcs:?}");
    }
    println!("  Time:         {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

fn cmd_clean(app: &AppConfig, args: CleanArgs) -> Result<()> {
    let mut config = CleanConfig::from(app);
    if let Some(file) = args.catalogue {
        config.catalogue_file = file;
    }
    if let Some(dir) = args.backup_dir {
        config.backup_dir = dir;
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    config.analyze_only = args.analyze;
    config.validate = args.validate;

    info!(catalogue = %config.catalogue_file.display(), strategy = %config.strategy, "cleaning catalogue");
    let report = clean_catalogue(&config)?;

    println!();
    println!("  Tables:     {}", report.original);
    if report.duplicates.is_empty() {
        println!("  Duplicates: none");
    } else {
        println!("  Duplicates: {} names", report.duplicates.len());
        for (name, count) in &report.duplicates {
            println!("    - {name}: {count}x");
        }
    }
    if report.ineligible > 0 {
        println!("  Unnamed:    {}", report.ineligible);
    }

    if report.saved {
        println!("  Retained:   {}", report.retained);
        println!("  Removed:    {}", report.original - report.retained);
        for (name, file) in report.discarded.iter().take(10) {
            println!("    - {name} ({file})");
        }
        if report.discarded.len() > 10 {
            println!("    ... and {} more", report.discarded.len() - 10);
        }
    } else if config.analyze_only {
        println!("  Catalogue not modified (analyze only).");
    }

    if config.validate {
        if report.violations.is_empty() {
            println!("  Validation: all records complete");
        } else {
            println!("  Validation: {} problems", report.violations.len());
            for violation in &report.violations {
                println!("    - {violation}");
            }
        }
    }
    println!();

    Ok(())
}

fn cmd_status(app: &AppConfig, args: StatusArgs) -> Result<()> {
    let mut config = UpdateConfig::from(app);
    if let Some(dir) = args.source_dir {
        config.source_dir = dir;
    }
    if let Some(file) = args.catalogue {
        config.catalogue_file = file;
    }
    if let Some(file) = args.hash_file {
        config.hash_file = file;
    }

    let report = catalogue_status(&config)?;

    println!();
    println!("  Source:      {}", config.source_dir.display());
    println!("  Catalogue:   {}", config.catalogue_file.display());
    println!("  Documents:   {}", report.documents);
    println!("  Tables:      {}", report.tables);
    println!("  Hashes:      {}", report.hash_entries);
    println!("  Pending:     {}", report.pending);
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let source = match path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter: a spinner per phase, a bar while processing documents.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✔"])
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: Phase) {
        if phase.is_terminal() {
            self.bar.finish_and_clear();
            return;
        }
        if phase == Phase::Processing {
            self.bar.set_style(bar_style());
        } else {
            self.bar.set_style(spinner_style());
        }
        self.bar.set_message(phase.label());
    }

    fn documents_found(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn document_done(&self, document_id: &str, outcome: &DocumentOutcome, current: usize, _total: usize) {
        self.bar.set_position(current as u64);
        self.bar.set_message(document_id.to_string());
        match outcome {
            DocumentOutcome::ParseFailed { reason, .. } | DocumentOutcome::IoFailed { reason } => {
                self.bar.println(format!("  skipped {document_id}: {reason}"));
            }
            DocumentOutcome::Unchanged | DocumentOutcome::Updated { .. } => {}
        }
    }

    fn done(&self, _summary: &UpdateSummary) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn update_flags_override_config() {
        let cli = Cli::try_parse_from([
            "schemacat",
            "update",
            "--source-dir",
            "docs",
            "--strategy",
            "merge",
            "-j",
            "8",
            "--force",
            "-m",
            "refresh",
        ])
        .unwrap();
        let Command::Update(args) = cli.command else {
            panic!("expected update");
        };

        let config = update_config(&AppConfig::default(), &args).unwrap();
        assert_eq!(config.source_dir, PathBuf::from("docs"));
        assert_eq!(config.strategy, MergeStrategy::Merge);
        assert_eq!(config.jobs, 8);
        assert!(config.force);
        assert_eq!(config.commit_message.as_deref(), Some("refresh"));
        assert_eq!(config.catalogue_file, AppConfig::default().paths.catalogue_file);
    }

    #[test]
    fn zero_jobs_rejected() {
        let cli = Cli::try_parse_from(["schemacat", "update", "--jobs", "0"]).unwrap();
        let Command::Update(args) = cli.command else {
            panic!("expected update");
        };
        assert!(update_config(&AppConfig::default(), &args).is_err());
    }

    #[test]
    fn unknown_strategy_rejected() {
        assert!(Cli::try_parse_from(["schemacat", "clean", "--strategy", "newest"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["schemacat", "status", "-vv", "--log-format", "json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::Status(_)));
    }
}
