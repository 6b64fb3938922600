//! Pivot CLI - probe a database cluster and exercise failover
//!
//! Reads a cluster file, then either prints the current topology or runs a
//! writer or reader failover against it and reports which host it landed on.

mod cluster;
mod commands;
mod config;
mod logging;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::cluster::Cluster;
use crate::config::{PivotConfig, default_config_path};

#[derive(Parser)]
#[command(name = "pivot")]
#[command(about = "Probe a database cluster and exercise failover", long_about = None)]
struct Args {
    /// Cluster file
    #[arg(long, short, env = "PIVOT_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current cluster topology
    Topology {
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Find the writer after losing the connection to it
    WriterFailover {
        /// Treat this `host[:port]` as the writer that was lost
        #[arg(long)]
        lost_writer: Option<String>,
    },

    /// Find a reader, falling back to the writer
    ReaderFailover {
        /// `host[:port]` of the reader whose connection failed
        #[arg(long)]
        failed_host: Option<String>,
    },

    /// Validate the cluster file and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` when a failover ran to completion without a connection.
async fn run(args: Args) -> anyhow::Result<bool> {
    let config = PivotConfig::load(&args.config)?;
    let _guard = logging::init(&config.logging.clone().with_verbosity(args.verbose))?;

    if let Command::CheckConfig = args.command {
        commands::check_config(&config)?;
        return Ok(true);
    }

    config.validate()?;
    let cluster = Cluster::connect(&config.cluster, config.failover.clone())?;

    match args.command {
        Command::Topology { json } => {
            commands::topology(&cluster, json).await?;
            Ok(true)
        }
        Command::WriterFailover { lost_writer } => {
            commands::writer_failover(&cluster, lost_writer.as_deref()).await
        }
        Command::ReaderFailover { failed_host } => {
            commands::reader_failover(&cluster, failed_host.as_deref()).await
        }
        Command::CheckConfig => Ok(true),
    }
}
