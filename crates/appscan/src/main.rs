//! `appscan` command-line entry point.

use anyhow::Result;
use appscan_logging::{init_logging, LogConfig, LOG_DIR_ENV};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};

mod cli;

use cli::ConfigArgs;

#[derive(Parser, Debug)]
#[command(
    name = "appscan",
    version,
    about = "Audit Apps Script manifests across a Google Workspace domain"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Also write a daily-rolling log file into this directory
    #[arg(long, global = true, env = LOG_DIR_ENV)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan every active user and merge their manifests into the store
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Caller access token, instead of asking the metadata server
        #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
        access_token: Option<String>,
    },

    /// Validate configuration and print it
    CheckConfig {
        #[command(flatten)]
        config: ConfigArgs,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the dataset and manifest table in the store
    InitStore {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "appscan",
        verbose: cli.verbose,
        log_dir: cli.log_dir.clone(),
    }) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Failed to initialize logging: {:#}", err);
            return ExitCode::from(1);
        }
    };

    if let Err(err) = install_signal_exit() {
        warn!("Signal handlers not installed: {:#}", err);
    }

    match run_command(cli.command) {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run {
            config,
            access_token,
        } => {
            let report = cli::run::run_audit(config, access_token)?;
            println!("{} {}", report.status.status_code(), report.status.message());
            Ok(if report.status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
        Commands::CheckConfig { config, json } => {
            cli::check_config(config, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::InitStore { config } => {
            cli::store::init_store(config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// SIGINT/SIGTERM end the process at once with 128 + signal; pending
/// records are not flushed.
fn install_signal_exit() -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                warn!("Received signal {}, exiting without flushing", sig);
                std::process::exit(128 + sig);
            }
        });
    }
    Ok(())
}
