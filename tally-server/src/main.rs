use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tally::config::PortabilityConfig;
use tally::services::{ColumnMapping, TransactionFilters};
use tally::AppContext;
use tally_server::server::{self, MigrateDirection};
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(short, long, global = true, default_value = "tally.db")]
    database: String,
    /// TOML file overriding the portability defaults
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[clap(short, long, default_value = "3000")]
        port: u16,
        #[clap(long)]
        cors_origin: Option<String>,
    },
    Db {
        #[clap(subcommand)]
        command: DbCommand,
    },
    Backup {
        #[clap(subcommand)]
        command: BackupCommand,
    },
    Csv {
        #[clap(subcommand)]
        command: CsvCommand,
    },
}

#[derive(Subcommand)]
enum DbCommand {
    Migrate {
        #[clap(subcommand)]
        direction: MigrateDirection,
    },
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Write a backup container for one account
    Export {
        #[clap(long)]
        tenant: String,
        /// Defaults to tally-backup-<date>.zip
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Restore a backup container into one account
    Restore {
        #[clap(long)]
        tenant: String,
        #[clap(short, long)]
        input: PathBuf,
        /// Delete the account's data and files first
        #[clap(long)]
        purge: bool,
    },
}

#[derive(Subcommand)]
enum CsvCommand {
    /// Export transactions as CSV, or as a zip with their attachments
    Export {
        #[clap(long)]
        tenant: String,
        #[clap(short, long)]
        output: Option<PathBuf>,
        /// Field codes in column order; defaults to the fields shown in lists
        #[clap(long, value_delimiter = ',')]
        fields: Vec<String>,
        #[clap(long)]
        attachments: bool,
        #[clap(flatten)]
        filters: FilterArgs,
    },
    /// Import transactions from a CSV file
    Import {
        #[clap(long)]
        tenant: String,
        #[clap(short, long)]
        input: PathBuf,
        /// Field code to zero-based column index, e.g. `--map total=2`
        #[clap(long = "map", value_parser = parse_mapping_entry, required = true)]
        mapping: Vec<(String, usize)>,
        #[clap(long)]
        skip_header: bool,
    },
}

#[derive(Args)]
struct FilterArgs {
    #[clap(long)]
    search: Option<String>,
    #[clap(long)]
    date_from: Option<String>,
    #[clap(long)]
    date_to: Option<String>,
    /// Field code, `-` prefix for descending
    #[clap(long, allow_hyphen_values = true)]
    ordering: Option<String>,
    #[clap(long)]
    category: Option<String>,
    #[clap(long)]
    project: Option<String>,
}

impl From<FilterArgs> for TransactionFilters {
    fn from(args: FilterArgs) -> Self {
        TransactionFilters {
            search: args.search,
            date_from: args.date_from,
            date_to: args.date_to,
            ordering: args.ordering,
            category_code: args.category,
            project_code: args.project,
        }
    }
}

fn parse_mapping_entry(raw: &str) -> Result<(String, usize), String> {
    let (code, column) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=COLUMN, got '{}'", raw))?;
    let column = column
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("'{}' is not a column index", column))?;
    Ok((code.trim().to_string(), column))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { port, cors_origin } => {
            info!("Starting server on port {}", port);
            server::start_server(port, &cli.database, cors_origin.as_deref(), config).await?;
        }
        Command::Db {
            command: DbCommand::Migrate { direction },
        } => {
            server::migrate_database(&cli.database, direction).await?;
        }
        Command::Backup { command } => {
            let ctx = AppContext::new(server::connect(&cli.database).await?, config);
            run_backup(&ctx, command).await?;
        }
        Command::Csv { command } => {
            let ctx = AppContext::new(server::connect(&cli.database).await?, config);
            run_csv(&ctx, command).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<PortabilityConfig> {
    match path {
        Some(path) => PortabilityConfig::from_file(path)?.apply_env(),
        None => PortabilityConfig::from_env(),
    }
}

async fn run_backup(ctx: &AppContext, command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Export { tenant, output } => {
            let output = output.unwrap_or_else(|| {
                PathBuf::from(tally::app_context::backup_filename(chrono::Utc::now()))
            });
            let report = ctx.export_backup_to_path(&tenant, &output, None).await?;
            for (model, rows) in &report.models {
                info!("  {:<20} {} rows", model, rows);
            }
            info!(
                "Wrote {} ({} files included, {} skipped)",
                output.display(),
                report.files_included,
                report.files_skipped
            );
        }
        BackupCommand::Restore {
            tenant,
            input,
            purge,
        } => {
            let report = ctx
                .restore_backup_from_path(&tenant, &input, purge, None)
                .await?;
            for (model, counts) in &report.models {
                info!(
                    "  {:<20} {} restored, {} skipped, {} failed",
                    model, counts.restored, counts.skipped, counts.failed
                );
            }
            info!(
                "Restored {} rows and {} files ({} files skipped, {} failed)",
                report.restored_rows(),
                report.files.restored,
                report.files.skipped,
                report.files.failed
            );
        }
    }
    Ok(())
}

async fn run_csv(ctx: &AppContext, command: CsvCommand) -> Result<()> {
    match command {
        CsvCommand::Export {
            tenant,
            output,
            fields,
            attachments,
            filters,
        } => {
            let output = output.unwrap_or_else(|| {
                PathBuf::from(tally::app_context::transactions_export_filename(attachments))
            });
            let report = ctx
                .export_transactions_to_path(
                    &tenant,
                    &filters.into(),
                    &fields,
                    attachments,
                    &output,
                    None,
                )
                .await?;
            info!(
                "Wrote {} transactions to {} ({} attachments, {} skipped)",
                report.rows,
                output.display(),
                report.files_included,
                report.files_skipped
            );
        }
        CsvCommand::Import {
            tenant,
            input,
            mapping,
            skip_header,
        } => {
            let bytes = tokio::fs::read(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let filename = input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mapping: ColumnMapping = mapping.into_iter().collect();
            let created = ctx
                .import_transactions_csv(&tenant, &filename, &bytes, &mapping, skip_header)
                .await?;
            info!("Imported {} transactions from {}", created, input.display());
        }
    }
    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("sqlx=warn,{}", log_level)))
        .without_time()
        .init();
}
