//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use lineage_core::staging::read_document_dir;
use lineage_core::{
    DirectorySink, MemorySink, MoveRequest, MoveResult, ProgressReporter, StagingSink,
    move_contacts,
};
use lineage_shared::{AppConfig, DocumentStore, MoveConfig, init_config, load_config};
use lineage_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// lineage: move contacts through a hierarchy and rewrite embedded lineage.
#[derive(Parser)]
#[command(
    name = "lineage",
    version,
    about = "Move contacts to a new parent and stage every document whose embedded lineage changes.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Move contacts under a new parent and stage the affected documents.
    Move {
        /// Contact ids to move (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        contacts: Vec<String>,

        /// New parent id, or `root` for the top of the hierarchy.
        #[arg(long)]
        parent: String,

        /// Document database (defaults to `[store].path`).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Staging directory (defaults to `[staging].output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Maximum concurrent reads (defaults to `[moves].read_concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Skip the `[hierarchy]` parent-type rules.
        #[arg(long)]
        no_hierarchy_check: bool,

        /// Clear a staging directory left over from an earlier move.
        #[arg(long)]
        force: bool,

        /// Resolve and report without writing any files.
        #[arg(long)]
        dry_run: bool,
    },

    /// Load JSON documents from a directory into the store.
    Import {
        /// Directory of `*.json` documents.
        dir: PathBuf,

        /// Document database (defaults to `[store].path`).
        #[arg(long)]
        db: Option<PathBuf>,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lineage=info",
        1 => "lineage=debug",
        _ => "lineage=trace",
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
        Command::Move {
            contacts,
            parent,
            db,
            out,
            concurrency,
            no_hierarchy_check,
            force,
            dry_run,
        } => {
            let options = MoveOptions {
                db,
                out,
                concurrency,
                no_hierarchy_check,
                force,
                dry_run,
            };
            cmd_move(&contacts, &parent, options).await
        }
        Command::Import { dir, db } => cmd_import(&dir, db).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// move
// ---------------------------------------------------------------------------

/// Flags of `lineage move` that override the config file.
struct MoveOptions {
    db: Option<PathBuf>,
    out: Option<PathBuf>,
    concurrency: Option<usize>,
    no_hierarchy_check: bool,
    force: bool,
    dry_run: bool,
}

fn move_config(config: &AppConfig, options: &MoveOptions) -> MoveConfig {
    let mut move_config = MoveConfig::from(config);
    if let Some(n) = options.concurrency {
        move_config.read_concurrency = n.max(1);
    }
    if options.no_hierarchy_check {
        move_config.enforce_hierarchy = false;
    }
    move_config
}

async fn cmd_move(contacts: &[String], parent: &str, options: MoveOptions) -> Result<()> {
    let config = load_config()?;
    let move_config = move_config(&config, &options);

    let db_path = options
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.store.path));
    if !db_path.exists() {
        return Err(eyre!(
            "document store not found at {} (run `lineage import` first)",
            db_path.display()
        ));
    }

    let request = MoveRequest::new(contacts.iter().cloned(), parent);
    info!(contacts = ?request.contact_ids, %parent, db = %db_path.display(), "moving contacts");

    let store: Arc<dyn DocumentStore> = Arc::new(Storage::open_readonly(&db_path).await?);
    let reporter = CliProgress::new();

    let (result, staged_to) = if options.dry_run {
        let sink = MemorySink::new();
        let result = run_move(store, &sink, &request, &move_config, &reporter).await?;
        (result, None)
    } else {
        let out_dir = options
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.staging.output_dir));
        let sink = DirectorySink::new(&out_dir, options.force)?;
        let result = run_move(store, &sink, &request, &move_config, &reporter).await?;
        (result, Some(out_dir))
    };

    println!();
    println!("  Moved:     {}", result.moved.join(", "));
    println!("  Parent:    {}", request.parent);
    println!("  Staged:    {} documents", result.staged);
    println!("  Unchanged: {}", result.unchanged);
    match staged_to {
        Some(dir) => println!("  Output:    {}", dir.display()),
        None => {
            println!("  Dry run, nothing written. Would stage:");
            for id in &result.staged_ids {
                println!("    {id}");
            }
        }
    }
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn run_move(
    store: Arc<dyn DocumentStore>,
    sink: &dyn StagingSink,
    request: &MoveRequest,
    config: &MoveConfig,
    reporter: &CliProgress,
) -> Result<MoveResult> {
    match move_contacts(store, sink, request, config, reporter).await {
        Ok(result) => Ok(result),
        Err(e) => {
            reporter.spinner.finish_and_clear();
            Err(e.into())
        }
    }
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

async fn cmd_import(dir: &std::path::Path, db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let db_path = db.unwrap_or_else(|| PathBuf::from(&config.store.path));

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| eyre!("cannot create {}: {e}", parent.display()))?;
        }
    }

    let docs = read_document_dir(dir)?;
    info!(count = docs.len(), dir = %dir.display(), db = %db_path.display(), "importing documents");

    let storage = Storage::open(&db_path).await?;
    let bar = ProgressBar::new(docs.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for doc in &docs {
        bar.set_message(doc.id.clone());
        if let Err(e) = storage.put(doc).await {
            bar.abandon();
            return Err(e.into());
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    println!(
        "Imported {} documents into {} ({} total)",
        docs.len(),
        db_path.display(),
        storage.document_count().await?
    );
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn staged(&self, id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Staging [{current}/{total}] {id}"));
    }

    fn done(&self, _result: &MoveResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
