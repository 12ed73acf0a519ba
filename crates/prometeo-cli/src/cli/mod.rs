//! CLI for the Prometeo download manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use prometeo_core::config;
use prometeo_core::manager::Manager;
use std::path::PathBuf;
use std::sync::Arc;

use commands::{run_download, run_resume, run_status};

/// Top-level CLI for the Prometeo download manager.
#[derive(Debug, Parser)]
#[command(name = "prometeo")]
#[command(about = "Prometeo: segmented, resumable HTTP download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Start a new download and follow it to completion.
    Download {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Directory the final file is written to (default: current directory).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Override the destination filename instead of the probed/derived one.
        #[arg(long, value_name = "NAME")]
        filename: Option<String>,
        /// Apply this speed ceiling (Mbps) for the duration of the run.
        #[arg(long, value_name = "MBPS")]
        speed_mbps: Option<f64>,
    },

    /// Rehydrate every unfinished download under the tempdir and run them in
    /// the foreground until they finish or Ctrl-C is pressed.
    Resume {
        /// Apply this speed ceiling (Mbps) for the duration of the run.
        #[arg(long, value_name = "MBPS")]
        speed_mbps: Option<f64>,
    },

    /// List every download tracked after a tempdir scan.
    Status,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Download { url, dir, filename, speed_mbps } => {
                let manager = Manager::new(cfg);
                let dir = dir.unwrap_or(std::env::current_dir()?);
                run_download(&manager, &url, &dir, filename.as_deref(), speed_mbps).await?
            }
            CliCommand::Resume { speed_mbps } => {
                let manager = Arc::new(Manager::new(cfg));
                run_resume(manager, speed_mbps).await?
            }
            CliCommand::Status => {
                let manager = Manager::new(cfg);
                run_status(&manager).await?
            }
        }

        Ok(())
    }
}
