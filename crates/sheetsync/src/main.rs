//! sheetsync CLI
//!
//! Command-line front end for spreadsheet-backed tables.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sheetsync::prelude::*;

/// Keep spreadsheet-backed SQLite tables in sync.
#[derive(Parser)]
#[command(name = "sheetsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:sheetsync.db")]
    database: String,

    /// Credential for mutating commands.
    #[arg(short, long, env = "SHEETSYNC_TOKEN")]
    token: Option<String>,

    /// JSON file of `{"token": "name"}` pairs. Tokens are looked up in
    /// the token table when not given.
    #[arg(long)]
    tokens_file: Option<PathBuf>,

    /// JSON config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Sqlite,
    Mysql,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables.
    Tables,

    /// Print every row of a table.
    Show {
        /// Table name.
        table: String,
    },

    /// Create a table from a CSV file.
    Ingest {
        /// CSV file to read.
        file: PathBuf,

        /// Table name hint (defaults to the file name).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Replace a table with the state in a JSON file.
    Save {
        /// Table name.
        table: String,

        /// JSON file with `rows` and optional `column_order`.
        state: PathBuf,
    },

    /// Show the SQL a save would run, without running it.
    Plan {
        /// Table name.
        table: String,

        /// JSON file with `rows` and optional `column_order`.
        state: PathBuf,

        /// Dialect to render for.
        #[arg(long, value_enum, default_value = "sqlite")]
        dialect: DialectArg,
    },

    /// Add a text column.
    AddColumn {
        /// Table name.
        table: String,

        /// Column label; sanitized into the column name.
        label: String,
    },

    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,

        /// Current column name.
        old: String,

        /// New column label; sanitized into the column name.
        new: String,
    },

    /// Update one row by primary key.
    UpdateRow {
        /// Table name.
        table: String,

        /// Primary key value.
        row_id: String,

        /// JSON file mapping column to new value (string or null).
        changes: PathBuf,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },

    /// Show the audit trail.
    Audit {
        /// Only records for this table.
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Issue an API token stored in the token table.
    IssueToken {
        /// Display name recorded in the audit trail.
        name: String,

        /// Days until the token expires.
        #[arg(long, default_value_t = TokenStore::DEFAULT_EXPIRY_DAYS)]
        days: i64,
    },

    /// Revoke an API token.
    RevokeToken {
        /// The token to revoke.
        token: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    };

    let options = SqliteConnectOptions::from_str(&cli.database)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    let store = TokenStore::new(pool.clone(), &config)?;
    store.ensure_table().await?;

    let resolver: Box<dyn IdentityResolver> = match &cli.tokens_file {
        Some(path) => Box::new(StaticTokens::from_file(path)?),
        None => Box::new(store.clone()),
    };
    let service = TableService::new(pool, resolver, config).await?;
    let token = cli.token.as_deref();

    match cli.command {
        Commands::Tables => {
            for table in service.list_tables().await? {
                println!("{table}");
            }
        }

        Commands::Show { table } => {
            print_json(&service.read_table(&table).await?)?;
        }

        Commands::Ingest { file, name } => {
            let hint = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("file has no name")?,
            };
            let input = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
            let report = service.ingest(token, &hint, input).await?;
            info!("Created table {} with {} rows", report.table, report.rows);
        }

        Commands::Save { table, state } => {
            let state: DesiredState = read_json(&state)?;
            let report = service.save(token, &table, &state).await?;
            info!("{}", report.message);
            print_json(&report)?;
        }

        Commands::Plan {
            table,
            state,
            dialect,
        } => {
            let state: DesiredState = read_json(&state)?;
            let dialect: Box<dyn StorageDialect> = match dialect {
                DialectArg::Sqlite => Box::new(SqliteDialect::new()),
                DialectArg::Mysql => Box::new(MySqlDialect::new(service.config().reorder_column_width)),
            };
            let preview = service.preview_save(&table, &state, &*dialect).await?;
            if preview.operations.is_empty() {
                info!("No structural changes.");
            }
            for sql in &preview.statements {
                println!("{sql};");
            }
        }

        Commands::AddColumn { table, label } => {
            let column = service.add_column(token, &table, &label).await?;
            println!("{column}");
        }

        Commands::RenameColumn { table, old, new } => {
            let column = service.rename_column(token, &table, &old, &new).await?;
            println!("{column}");
        }

        Commands::UpdateRow {
            table,
            row_id,
            changes,
        } => {
            let changes: Row = read_json(&changes)?;
            let update = service.update_row(token, &table, &row_id, &changes).await?;
            info!("{}", update.message());
            print_json(&update)?;
        }

        Commands::DropTable { table } => {
            service.delete_table(token, &table).await?;
            info!("Deleted table {table}");
        }

        Commands::Audit { table } => {
            let records = service.audit_entries(table.as_deref()).await?;
            if records.is_empty() {
                info!("No audit records.");
            }
            for record in &records {
                println!(
                    "{} {} {} {} {} {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S%:z"),
                    record.actor,
                    record.table,
                    record.column,
                    record.row_id,
                    record.description
                );
            }
        }

        Commands::IssueToken { name, days } => {
            let issued = store.issue(&name, days).await?;
            info!("Token for {} expires {}", issued.actor, issued.expires_at);
            println!("{}", issued.token);
        }

        Commands::RevokeToken { token } => {
            if store.revoke(&token).await? {
                info!("Token revoked.");
            } else {
                info!("No such token.");
            }
        }
    }

    service.audit().flush().await;
    Ok(())
}
