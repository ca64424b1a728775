use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::ratelimit::{ListKind, RateLimiter, RedisStore};
use turnstile::sync::{redis_subscribe, spawn_listener, RedisPublisher};

/// Per-identity rate limiter administration.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record a request for each id and print the decision
    Check {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Reset the window counter of an id
    Reset { id: String },
    /// Manage the whitelist
    Whitelist {
        #[command(subcommand)]
        action: ListCommand,
    },
    /// Manage the blacklist
    Blacklist {
        #[command(subcommand)]
        action: ListCommand,
    },
    /// Apply list changes published by other instances until shut down
    Serve,
}

#[derive(Debug, Subcommand)]
enum ListCommand {
    /// Add an id and notify other instances
    Add { id: String },
    /// Remove an id and notify other instances
    Remove { id: String },
    /// Print the list as JSON, or only `id` if it is listed
    Show { id: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = TurnstileConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    let limiter_config = config.effective_limiter();
    info!(limiter = %limiter_config.name, "Configuration loaded");

    let client = redis::Client::open(config.store.redis_url.as_str())
        .with_context(|| format!("invalid redis url {}", config.store.redis_url))?;
    let store = Arc::new(RedisStore::with_client(client.clone()).await?);
    let publisher = Arc::new(RedisPublisher::connect(client.clone()).await?);
    let limiter = Arc::new(RateLimiter::with_publisher(limiter_config, store, publisher).await?);

    match cli.command {
        Command::Check { ids } => {
            for id in ids {
                let verdict = limiter.check(&id).await?;
                println!("{}\t{}\t{:?}", id, verdict.count, verdict.decision);
            }
        }
        Command::Reset { id } => limiter.check_reset(&id).await?,
        Command::Whitelist { action } => {
            run_list_command(&limiter, ListKind::White, action).await?
        }
        Command::Blacklist { action } => {
            run_list_command(&limiter, ListKind::Black, action).await?
        }
        Command::Serve => {
            let messages = redis_subscribe(&client, limiter.name()).await?;
            let listener = spawn_listener(limiter.clone(), messages);
            let abort = listener.abort_handle();

            tokio::select! {
                _ = shutdown_signal() => abort.abort(),
                result = listener => result?,
            }
            info!("Turnstile sync listener stopped");
        }
    }

    Ok(())
}

async fn run_list_command(
    limiter: &RateLimiter,
    list: ListKind,
    action: ListCommand,
) -> anyhow::Result<()> {
    match (list, action) {
        (ListKind::White, ListCommand::Add { id }) => limiter.add_white_list(&id, true).await?,
        (ListKind::Black, ListCommand::Add { id }) => limiter.add_black_list(&id, true).await?,
        (ListKind::White, ListCommand::Remove { id }) => {
            limiter.remove_white_list(&id, true).await?
        }
        (ListKind::Black, ListCommand::Remove { id }) => {
            limiter.remove_black_list(&id, true).await?
        }
        (list, ListCommand::Show { id }) => {
            let entries = match list {
                ListKind::White => limiter.white_list(),
                ListKind::Black => limiter.black_list(),
            };
            let shown: Vec<String> = match id {
                Some(id) => entries.into_iter().filter(|entry| *entry == id).collect(),
                None => entries,
            };
            println!("{}", serde_json::to_string(&shown)?);
        }
    }
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
