//! sharebot CLI entry point.
//!
//! Composition root: loads configuration, wires logging, builds the lifecycle
//! coordinator, serves liveness and webhook over HTTP, and owns the start
//! retry policy and signal handling.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sharebot::config::{Config, Mode};
use sharebot::handlers::JournalHandler;
use sharebot::lifecycle::{Lifecycle, LifecycleError};
use sharebot::transport::BotApiTransport;
use sharebot::{heartbeat, logging, server};

/// Initial delay between start attempts after a connection failure.
const INITIAL_RETRY_SECS: u64 = 2;

/// Upper bound for the start retry delay.
const MAX_RETRY_SECS: u64 = 60;

/// Telegram update-delivery front end.
#[derive(Parser)]
#[command(name = "sharebot", version, about)]
struct Cli {
    /// Path to the TOML config file (default: `$SHAREBOT_CONFIG_PATH` or `./config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute. Defaults to `run`.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the bot and the HTTP server until interrupted.
    Run {
        /// Override the configured transport mode.
        #[arg(long)]
        mode: Option<Mode>,
        /// Override the configured HTTP port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate configuration and credentials, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run {
        mode: None,
        port: None,
    });

    let result = match command {
        Command::Run { mode, port } => handle_run(cli.config, mode, port).await,
        Command::CheckConfig => handle_check_config(cli.config),
    };

    if let Err(e) = &result {
        // Failures before logging was wired would otherwise go nowhere.
        logging::init_console();
        error!("critical error: {e:#}");
    }
    result
}

/// Validate configuration without touching the network.
fn handle_check_config(path: Option<PathBuf>) -> anyhow::Result<()> {
    logging::init_console();

    let config = Config::load_from(path).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    let credentials = config.credentials().context("invalid credentials")?;

    info!(
        mode = %config.telegram.mode,
        api_id = credentials.api_id,
        port = config.server.port,
        "configuration is valid"
    );
    Ok(())
}

/// Run the bot until SIGINT/SIGTERM.
async fn handle_run(
    path: Option<PathBuf>,
    mode: Option<Mode>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let config_path = Config::resolve_path(path);
    let mut config =
        Config::load_from(Some(config_path.clone())).context("failed to load configuration")?;
    if let Some(mode) = mode {
        config.telegram.mode = mode;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let _logging_guard = match &config.logging.dir {
        Some(dir) => Some(logging::init_service(dir)?),
        None => {
            logging::init_console();
            None
        }
    };

    info!(
        config = %config_path.display(),
        mode = %config.telegram.mode,
        port = config.server.port,
        "sharebot starting"
    );

    let transport = Arc::new(BotApiTransport::from_config(&config.telegram));
    let lifecycle = Arc::new(Lifecycle::new(
        config.clone(),
        transport,
        Arc::new(JournalHandler),
    ));

    // Liveness comes up first and answers whatever happens to the bot.
    let shutdown = CancellationToken::new();
    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let router = server::build_router(
        Arc::clone(&lifecycle),
        config.telegram.webhook_secret.clone(),
    );
    let server_task = tokio::spawn(server::serve(listener, router, shutdown.clone()));

    if config.server.keep_alive_seconds > 0 {
        tokio::spawn(heartbeat::run_keep_alive(
            Duration::from_secs(config.server.keep_alive_seconds),
            Arc::clone(&lifecycle),
            shutdown.clone(),
        ));
    }

    let started = tokio::select! {
        result = start_with_retry(&lifecycle) => result,
        () = shutdown_signal() => {
            info!("shutdown requested before the bot started");
            Ok(false)
        }
    };

    let run_result = match started {
        Ok(true) => {
            info!("bot is running");
            shutdown_signal().await;
            info!("received shutdown signal, initiating graceful shutdown");
            Ok(())
        }
        Ok(false) => Ok(()),
        Err(e) => Err(anyhow::Error::new(e).context("bot failed to start")),
    };

    lifecycle.stop().await;
    shutdown.cancel();

    server_task
        .await
        .context("HTTP server task panicked")?
        .context("HTTP server failed")?;

    info!("sharebot stopped");
    run_result
}

/// Start the bot, retrying connection failures with exponential backoff.
///
/// Authentication and configuration failures are returned immediately.
async fn start_with_retry(lifecycle: &Arc<Lifecycle>) -> Result<bool, LifecycleError> {
    let mut delay_secs = INITIAL_RETRY_SECS;
    loop {
        match lifecycle.start().await {
            Ok(()) => return Ok(true),
            Err(LifecycleError::Connection(reason)) => {
                warn!(error = %reason, retry_in_secs = delay_secs, "bot start failed, retrying");
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                delay_secs = delay_secs.saturating_mul(2).min(MAX_RETRY_SECS);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Resolve on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
