//! Chatsync ETL - daily chat-platform extract into the warehouse

use anyhow::{Context, Result};
use chatsync_common::logging::{init_logging, LogConfig, LogLevel};
use chatsync_etl::{EtlConfig, EtlPipeline, RecordType, TimeWindow};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "chatsync-etl")]
#[command(author, version, about = "Chat platform to warehouse ETL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Replace the previous day's partitions
    Run {
        /// Trigger timestamp; the day before it is extracted
        #[arg(short, long)]
        execution_date: String,

        /// Record type to load (repeatable); defaults to messages then conversations
        #[arg(short, long = "record-type")]
        record_type: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("chatsync-etl")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            execution_date,
            record_type,
        } => {
            let window = TimeWindow::for_execution(&execution_date)
                .context("Invalid --execution-date")?;
            let record_types = if record_type.is_empty() {
                RecordType::ALL.to_vec()
            } else {
                record_type
                    .iter()
                    .map(|name| name.parse::<RecordType>())
                    .collect::<Result<Vec<_>, _>>()?
            };

            let config = EtlConfig::from_env().context("Failed to load configuration")?;
            let pipeline = EtlPipeline::from_config(&config)
                .await
                .context("Failed to initialize pipeline")?;

            for record_type in record_types {
                let summary = pipeline
                    .run(window, record_type)
                    .await
                    .with_context(|| format!("{} run failed for {}", record_type, window))?;
                info!(
                    record_type = %record_type,
                    rows = summary.load.rows,
                    table = %summary.load.table,
                    "Partition loaded"
                );
            }
        },
    }

    info!("ETL complete");
    Ok(())
}
