//! CLI for the DCM data connection manager.

mod commands;
mod scenario;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dcm_core::config::{self, DcmConfig};
use std::path::{Path, PathBuf};

use commands::{
    run_classify, run_completions, run_config, run_man, run_schedule, run_simulate,
};

/// Top-level CLI for the DCM data connection manager.
#[derive(Debug, Parser)]
#[command(name = "dcm")]
#[command(about = "DCM: cellular data connection lifecycle manager", long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of ~/.config/dcm/config.toml.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print the delay before each retry under a backoff schedule.
    Schedule {
        /// Schedule string, e.g. "max_retries=3,1000,2000:500".
        spec: String,
        /// Number of attempts to show (default: the schedule's retry bound).
        #[arg(long, value_name = "N")]
        attempts: Option<u32>,
    },

    /// Show how a setup failure cause would be handled.
    Classify {
        /// Cause name (e.g. insufficient-resources) or code (decimal or 0x hex).
        cause: String,
        /// Retries already made before this failure.
        #[arg(long, default_value = "0", value_name = "N")]
        attempts: u32,
        /// Reason the bring-up was requested for (matches operator overrides).
        #[arg(long, value_name = "R")]
        reason: Option<String>,
        /// Schedule to classify against (default: the configured default schedule).
        #[arg(long, value_name = "S")]
        schedule: Option<String>,
    },

    /// Run a scripted scenario against the state machine on a virtual clock.
    Simulate {
        /// Scenario file (.toml or .json).
        path: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the config file path and the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the man page (roff).
    Man,
}

fn load_config(path: Option<&Path>) -> Result<(PathBuf, DcmConfig)> {
    match path {
        Some(p) => Ok((p.to_path_buf(), config::load_from(p)?)),
        None => Ok((config::config_path()?, config::load_or_init()?)),
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let config_file = cli.config_file.as_deref();

        match cli.command {
            CliCommand::Schedule { spec, attempts } => run_schedule(&spec, attempts)?,
            CliCommand::Classify {
                cause,
                attempts,
                reason,
                schedule,
            } => {
                let (_, cfg) = load_config(config_file)?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_classify(&cfg, &cause, attempts, reason.as_deref(), schedule.as_deref())?;
            }
            CliCommand::Simulate { path, json } => {
                let (_, cfg) = load_config(config_file)?;
                run_simulate(cfg, &path, json).await?;
            }
            CliCommand::Config => {
                let (path, cfg) = load_config(config_file)?;
                run_config(&path, &cfg)?;
            }
            CliCommand::Completions { shell } => run_completions(shell)?,
            CliCommand::Man => run_man()?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
