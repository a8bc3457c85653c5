//! mssql-upsert CLI - set-based upsert and delete against SQL Server.

mod demo;

use clap::{Parser, Subcommand};
use mssql_upsert::identifier::validate_identifier;
use mssql_upsert::{Config, MssqlTarget, SyncError, SyncTarget, Syncer};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-upsert")]
#[command(about = "Set-based upsert and delete of record collections into SQL Server")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test database connections
    HealthCheck,

    /// Show a table's columns and the statements an upsert by primary key would run
    Inspect {
        /// Schema of the target table
        #[arg(long, default_value = "dbo")]
        schema: String,

        /// Target table name
        #[arg(long)]
        table: String,
    },

    /// Run the customer scenario: upsert by key, upsert by name, delete
    Demo {
        /// Schema of the customer table
        #[arg(long, default_value = "Sales")]
        schema: String,

        /// Customer table name
        #[arg(long, default_value = "Customer")]
        table: String,

        /// Print the generated statements without changing any rows
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(SyncError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::HealthCheck => {
            let start = Instant::now();
            let target = MssqlTarget::new(&config.connection).await?;
            let version = target.health_check().await?;
            let latency_ms = start.elapsed().as_millis();

            if cli.output_json {
                let result = serde_json::json!({
                    "healthy": true,
                    "server": config.connection.describe(),
                    "latency_ms": latency_ms,
                    "version": version,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Target (MSSQL): OK ({}ms) {}",
                    latency_ms,
                    config.connection.describe()
                );
                println!("  Version: {}", version);
                println!("\n  Overall: HEALTHY");
            }
        }

        Commands::Inspect { schema, table } => {
            validate_identifier(&schema)?;
            validate_identifier(&table)?;

            let target = MssqlTarget::new(&config.connection).await?;
            let fields = target.table_fields(&schema, &table).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&fields)?);
                return Ok(());
            }

            println!("{}.{}:", schema, table);
            for f in &fields {
                let mut flags = Vec::new();
                if f.is_primary_key {
                    flags.push("pk");
                }
                if f.is_identity {
                    flags.push("identity");
                }
                if f.has_default {
                    flags.push("default");
                }
                if f.is_computed {
                    flags.push("computed");
                }
                if !f.is_nullable {
                    flags.push("not null");
                }
                println!(
                    "  {:>3} {:<30} {:<18} {}",
                    f.column_id,
                    f.column_name,
                    f.data_type,
                    flags.join(", ")
                );
            }

            // Computed columns are skipped by the planner itself
            let writable: Vec<&str> = fields
                .iter()
                .filter(|f| !f.is_rowversion())
                .map(|f| f.column_name.as_str())
                .collect();
            let syncer = Syncer::with_options(target, config.sync.clone());
            match syncer
                .preview_upsert_columns(&schema, &table, &writable)
                .await
            {
                Ok((ddl, batch)) => {
                    println!("\nStaging type:\n{}\n\nUpsert batch:\n{}", ddl, batch);
                }
                Err(SyncError::NoPrimaryKey(_)) => {
                    println!("\nNo primary key: upsert needs an explicit key type");
                }
                Err(e) => return Err(e),
            }
        }

        Commands::Demo {
            schema,
            table,
            dry_run,
        } => {
            validate_identifier(&schema)?;
            validate_identifier(&table)?;

            let target = MssqlTarget::new(&config.connection).await?;
            let syncer = Syncer::with_options(target, config.sync.clone());

            if dry_run {
                let (ddl, batch) = syncer
                    .preview_upsert::<demo::Customer>(&schema, &table)
                    .await?;
                println!("Staging type:\n{}\n\nUpsert batch:\n{}", ddl, batch);
                return Ok(());
            }

            let report = demo::run(&syncer, &schema, &table).await?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nDemo completed!");
                for step in &report {
                    println!("  {}: {} rows", step.step, step.rows_affected);
                }
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
