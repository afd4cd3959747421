//! swend - SWEN daemon and operator CLI
//!
//! Runs the decision cycle and the health loop, and gives operators a
//! terminal view of the ticket pool:
//! - `run`: both periodic actors until a shutdown signal
//! - `cycle`, `heal`, `check-health`: single passes
//! - `status`, `tickets`: inspect and resolve open tickets

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use swen_daemon::{DaemonError, SwenConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::tickets::TicketCommands;
use output::OutputFormat;

/// SWEN daemon CLI
#[derive(Parser)]
#[command(name = "swend")]
#[command(about = "SWEN - cost-aware placement decisions with bounded change control", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SWEN_CONFIG")]
    config: Option<String>,

    /// Log level (overrides logging.level)
    #[arg(long, env = "SWEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "SWEN_LOG_JSON")]
    json: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the decision cycle and health loop
    Run,

    /// Run one decision cycle
    Cycle,

    /// Show pool status and recent health events
    Status,

    /// Run the remediation loop once, or continuously with --monitor
    Heal {
        /// Keep running until interrupted
        #[arg(long)]
        monitor: bool,

        /// Seconds between cycles when monitoring
        #[arg(long, requires = "monitor")]
        interval: Option<u64>,
    },

    /// Probe all subsystems without remediating
    CheckHealth,

    /// Inspect and resolve tickets
    Tickets {
        #[command(subcommand)]
        command: TicketCommands,
    },

    /// Print the effective configuration as TOML
    ShowConfig {
        /// Print built-in defaults instead
        #[arg(long)]
        defaults: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match SwenConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match execute(cli.command, config, cli.output).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let corrupt = e
                .downcast_ref::<DaemonError>()
                .map(DaemonError::is_corrupt)
                .unwrap_or(false);
            if corrupt {
                tracing::error!(error = %e, "Persisted state is corrupt; refusing to start");
                output::print_error(&format!(
                    "persisted state is corrupt and needs operator attention: {:#}",
                    e
                ));
                ExitCode::from(2)
            } else {
                output::print_error(&format!("{:#}", e));
                ExitCode::FAILURE
            }
        }
    }
}

async fn execute(
    command: Commands,
    config: SwenConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Commands::Run => commands::run::execute(config).await,
        Commands::Cycle => commands::cycle::run_once(config, format).await,
        Commands::Status => commands::cycle::status(config, format).await,
        Commands::Heal { monitor, interval } => {
            commands::health::heal(config, monitor, interval, format).await
        }
        Commands::CheckHealth => commands::health::check(config, format).await,
        Commands::Tickets { command } => commands::tickets::execute(command, config, format).await,
        Commands::ShowConfig { defaults } => {
            let rendered = if defaults {
                SwenConfig::default().to_toml()?
            } else {
                config.to_toml()?
            };
            println!("{}", rendered);
            Ok(())
        }
    }
}
