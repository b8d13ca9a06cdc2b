use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trailgain::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "trailgain",
    version,
    about = "Tracks rating gains of hiking-platform participants across concluded events",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workers and the HTTP control surface
    Serve {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not start the workers until asked through the control surface
        #[arg(long, default_value = "false")]
        no_autostart: bool,
    },

    /// Manage the platform account pool
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Run one cycle of a single worker (past-event, points-gain, route-cache)
    RunOnce {
        /// Worker id
        worker: String,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Add an account, or replace the secret of an existing one
    Add {
        username: String,
        secret: String,
    },

    /// List configured usernames
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Serve { port, no_autostart } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if no_autostart {
                config.workers.autostart = false;
            }
            tracing::info!(
                database = %config.database.path.display(),
                bind = %config.server.bind_address(),
                "Starting trailgain"
            );
            commands::serve(config).await?;
        }

        Commands::Account { action } => match action {
            AccountAction::Add { username, secret } => {
                commands::account_add(&config, &username, &secret)?;
            }
            AccountAction::List => commands::account_list(&config)?,
        },

        Commands::RunOnce { worker } => {
            tracing::info!(worker = %worker, "Running a single cycle");
            commands::run_once(&config, &worker).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("trailgain=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("trailgain={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
