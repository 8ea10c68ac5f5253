//! obdl-feed - live event feed for the OBD logger
//!
//! Polls the backend's `/events` endpoint, prints a card per event and keeps
//! the cards in sync with their processing status. Card expansion and custom
//! labels persist under the state directory. Commands are read from stdin,
//! one per line (`help` lists them).

use anyhow::{Context, Result};
use clap::Parser;
use obdl_common::config::{self, CliOverrides, FeedSettings, TomlConfig};
use obdl_feed::client::{FeedClient, HttpFeedClient};
use obdl_feed::commands::{Command, USAGE};
use obdl_feed::overrides::{FileStorage, Overrides};
use obdl_feed::render::TerminalRenderer;
use obdl_feed::runtime::{FeedRuntime, RuntimeOptions};
use obdl_feed::ticker::Ticker;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for obdl-feed
#[derive(Parser, Debug)]
#[command(name = "obdl-feed")]
#[command(about = "Live event feed for the OBD logger")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides OBDL_FEED_URL and the config file)
    #[arg(long)]
    feed_url: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Directory holding persisted expansion flags and labels
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Poll once, print the feed and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before logging so its level can seed the filter
    let toml_config = match config::config_path(args.config.as_deref()) {
        Some(path) => config::load_toml_config(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };
    let level = toml_config
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("obdl_feed={level},obdl_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting obdl-feed v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = CliOverrides {
        feed_url: args.feed_url.clone(),
        poll_interval_ms: args.poll_interval_ms,
        state_dir: args.state_dir.clone(),
    };
    let settings = FeedSettings::resolve(&cli, &toml_config).context("Invalid configuration")?;
    info!(
        feed_url = %settings.feed_url,
        poll_interval_ms = settings.poll_interval.as_millis() as u64,
        state_dir = %settings.state_dir.display(),
        "Configuration resolved"
    );

    let client = HttpFeedClient::new(
        &settings.feed_url,
        settings.request_timeout.max(settings.delete_timeout),
    )
    .context("Failed to create feed client")?;
    let client: Arc<dyn FeedClient> = Arc::new(client);

    if let Err(e) = client.health().await {
        warn!(error = %e, "Backend health check failed, polling anyway");
    }

    let overrides = Overrides::load(FileStorage::new(&settings.state_dir));
    let color = std::io::stdout().is_terminal();
    let renderer = TerminalRenderer::new(std::io::stdout(), settings.feed_url.clone()).with_color(color);
    let mut runtime = FeedRuntime::new(
        client,
        overrides,
        renderer,
        RuntimeOptions::from_settings(&settings),
    );

    if args.once {
        runtime.poll_once().await.context("Failed to fetch events")?;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let commands = spawn_command_reader();
    runtime
        .run(Ticker::new(settings.poll_interval), commands, shutdown)
        .await;

    info!("obdl-feed stopped");
    Ok(())
}

/// Read commands from stdin on a plain thread
///
/// A blocking stdin read would otherwise hold up runtime shutdown; a
/// detached thread does not.
fn spawn_command_reader() -> mpsc::UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(Command::Help) => println!("{}", USAGE),
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("{} (type 'help' for commands)", e),
            }
        }
    });
    rx
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
