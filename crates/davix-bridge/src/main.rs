//! Davix Bridge operator CLI
//!
//! Installs and prints the bridge schema, inspects the work queues and keeps
//! the user license read-model reconciled.

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use davix_bridge::logs_cmd::{self, LogsAction};
use davix_bridge::queue_cmd::{self, QueueAction};
use davix_bridge::reconcile_cmd::{self, ReconcileArgs};
use davix_bridge::schema::TableNames;
use davix_bridge::schema_cmd::{self, SchemaArgs};
use davix_bridge::storage::BridgeDatabase;
use davix_core::config::{self, Config};
use davix_core::tracing_init::{default_filter, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "davix-bridge")]
#[command(version, about = "Davix Bridge - license bridge tables and work queues")]
struct Cli {
    /// Path to a JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to SQLite database file.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the CREATE TABLE statements
    Schema(SchemaArgs),
    /// Install the schema into the database
    Migrate,
    /// Inspect and repair the work queues
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Sync the user read-model from key records
    Reconcile(ReconcileArgs),
    /// Audit log maintenance
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    init_tracing(
        &default_filter(env!("CARGO_PKG_NAME"), &config.log_level),
        cli.log_json,
    );

    let mut out = io::stdout().lock();

    // Printing DDL needs no database.
    if let Commands::Schema(args) = &cli.command {
        return schema_cmd::print(args, &config.database, &mut out);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting davix-bridge");
    let db = open_database(cli.db_path, &config).await?;

    match cli.command {
        Commands::Schema(_) => Ok(()),
        Commands::Migrate => schema_cmd::migrate(&db, &mut out).await,
        Commands::Queue { action } => queue_cmd::run(action, &db, &config.queue, &mut out).await,
        Commands::Reconcile(args) => {
            reconcile_cmd::run(&args, &db, &config.reconcile, &mut out).await
        }
        Commands::Logs { action } => logs_cmd::run(action, &db, &config.audit, &mut out).await,
    }
}

async fn open_database(db_path: Option<PathBuf>, config: &Config) -> anyhow::Result<BridgeDatabase> {
    let tables = TableNames::new(&config.database.table_prefix)?;
    let path = match db_path.or_else(|| config.database.path.clone()) {
        Some(path) => path,
        None => config::database_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine config directory; pass --db-path"))?,
    };
    info!(path = %path.display(), prefix = %tables.prefix(), "Opening bridge database");
    Ok(BridgeDatabase::open(&path, tables).await?)
}
