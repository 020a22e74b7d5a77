//! Blobmend CLI - renames non-conformant assets in one storage container and
//! rewrites the posts that embed them.
//!
//! Exit codes: `0` clean run, `1` start-up or listing error, `2` some
//! candidates were rolled back or failed (or could not be planned in a dry
//! run), `3` a rollback failed and posts now reference missing objects.

mod reporter;

use anyhow::{Context, Result};
use blobmend::{
    Coordinator, FsObjectStore, ListingDefaults, NullReporter, PlannedRename, PostsSchema,
    ProgressReporter, RenameConfig, RenameDefaults, RunSummary, SqliteReferenceStore,
};
use clap::{Parser, ValueEnum};
use reporter::ConsoleReporter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "blobmend")]
#[command(about = "Rename stored media assets and keep post references in sync")]
struct Args {
    /// Directory holding one subdirectory per container
    #[arg(long, env = "BLOBMEND_STORAGE_ROOT")]
    storage_root: PathBuf,

    /// Container to process
    #[arg(long, env = "BLOBMEND_CONTAINER")]
    container: String,

    /// SQLite database holding the posts table
    #[arg(long, env = "BLOBMEND_DATABASE")]
    database: PathBuf,

    /// Names starting with this prefix are left alone
    #[arg(long, env = "BLOBMEND_PREFIX", default_value = RenameDefaults::CONFORMANCE_PREFIX)]
    prefix: String,

    /// Delay between copy status checks, in milliseconds
    #[arg(
        long,
        env = "BLOBMEND_POLL_INTERVAL_MS",
        default_value_t = RenameDefaults::COPY_POLL_INTERVAL.as_millis() as u64
    )]
    poll_interval_ms: u64,

    /// Give up on a pending copy after this many seconds
    #[arg(
        long,
        env = "BLOBMEND_COPY_TIMEOUT_SECS",
        default_value_t = RenameDefaults::COPY_TIMEOUT.as_secs()
    )]
    copy_timeout_secs: u64,

    /// Entries requested per listing page
    #[arg(long, env = "BLOBMEND_PAGE_SIZE", default_value_t = ListingDefaults::PAGE_SIZE)]
    page_size: usize,

    /// Posts table name
    #[arg(long, env = "BLOBMEND_TABLE")]
    table: Option<String>,

    /// Primary key column of the posts table
    #[arg(long, env = "BLOBMEND_ID_COLUMN")]
    id_column: Option<String>,

    /// Title column of the posts table
    #[arg(long, env = "BLOBMEND_TITLE_COLUMN")]
    title_column: Option<String>,

    /// Body column of the posts table
    #[arg(long, env = "BLOBMEND_BODY_COLUMN")]
    body_column: Option<String>,

    /// Resolve references and print the plan without changing anything
    #[arg(long, env = "BLOBMEND_DRY_RUN")]
    dry_run: bool,

    /// Print the run summary (or plan) as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

impl Args {
    fn rename_config(&self) -> RenameConfig {
        RenameConfig::new()
            .with_prefix(self.prefix.clone())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_copy_timeout(Duration::from_secs(self.copy_timeout_secs))
            .with_page_size(self.page_size)
    }

    fn posts_schema(&self) -> PostsSchema {
        let mut schema = PostsSchema::default();
        if let Some(table) = &self.table {
            schema.table = table.clone();
        }
        if let Some(column) = &self.id_column {
            schema.id_column = column.clone();
        }
        if let Some(column) = &self.title_column {
            schema.title_column = column.clone();
        }
        if let Some(column) = &self.body_column {
            schema.body_column = column.clone();
        }
        schema
    }
}

fn init_logging(debug: bool, format: LogFormat) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries progress lines and JSON output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn exit_code(summary: &RunSummary) -> u8 {
    if summary.unrecoverable > 0 {
        3
    } else if !summary.is_clean() {
        2
    } else {
        0
    }
}

fn plan_exit_code(planned: &[PlannedRename]) -> u8 {
    if planned.iter().any(|p| p.error.is_some()) {
        2
    } else {
        0
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    info!(
        storage_root = %args.storage_root.display(),
        container = %args.container,
        database = %args.database.display(),
        dry_run = args.dry_run,
        "Starting blobmend"
    );

    let objects = FsObjectStore::open(&args.storage_root, args.container.clone())
        .with_context(|| format!("Failed to open container '{}'", args.container))?;
    let references = SqliteReferenceStore::open(&args.database, args.posts_schema())
        .with_context(|| format!("Failed to open database {}", args.database.display()))?;

    let reporter: Arc<dyn ProgressReporter> = if args.json {
        Arc::new(NullReporter)
    } else {
        Arc::new(ConsoleReporter::new(std::io::stdout()))
    };
    let coordinator = Coordinator::new(
        args.rename_config(),
        Arc::new(references),
        Arc::new(objects),
        reporter,
    )?;

    if args.dry_run {
        let planned = coordinator.plan().await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&planned)?);
        }
        return Ok(ExitCode::from(plan_exit_code(&planned)));
    }

    let summary = coordinator.run().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(ExitCode::from(exit_code(&summary)))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug, args.log_format);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
