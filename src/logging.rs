//! Tracing setup for the bot process.
//!
//! [`init_service`] is used by `run` when a log directory is configured: JSON
//! lines to a daily file plus human output on stderr. [`init_console`] covers
//! everything else, including early failures before the config is known.
//!
//! Both honour `RUST_LOG`. Without it, [`DEFAULT_DIRECTIVES`] keep the bot's
//! own lifecycle and dispatch lines at `info` while quieting the HTTP and
//! SQL stacks underneath.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
///
/// `sqlx=warn` silences the per-statement logs of the update journal;
/// `hyper` and `reqwest` would otherwise log every long-poll request.
pub const DEFAULT_DIRECTIVES: &str = "info,sharebot=info,sqlx=warn,hyper=warn,reqwest=warn,axum=info";

/// File name prefix of the rolling service log.
pub const LOG_FILE_PREFIX: &str = "sharebot.log";

/// Keeps the non-blocking file writer alive.
///
/// Dropping it flushes pending lines, so `main` holds it until exit.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Build the active filter: `RUST_LOG` if it parses, else [`DEFAULT_DIRECTIVES`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the service subscriber.
///
/// The JSON layer flattens the current span into every line, so the
/// `event_id` and `kind` fields of a dispatch span land next to whatever
/// the handler logs.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_service(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(LoggingGuard { _guard: guard })
}

/// Install stderr-only logging. A no-op once any subscriber is installed,
/// so it is safe to call on error paths.
pub fn init_console() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
