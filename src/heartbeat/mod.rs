//! Keep-alive heartbeat.
//!
//! Runs as a background Tokio task and logs a liveness line with the bot
//! state at a fixed interval, so hosting platforms that watch log output see
//! the process as active.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::lifecycle::Lifecycle;

/// Run the keep-alive loop until `shutdown` fires.
///
/// The first line is logged one full `interval` after the call.
pub async fn run_keep_alive(
    interval: Duration,
    lifecycle: Arc<Lifecycle>,
    shutdown: CancellationToken,
) {
    info!(interval_secs = interval.as_secs(), "keep-alive started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                info!(state = %lifecycle.state(), mode = %lifecycle.mode(), "keeping bot alive");
            }
        }
    }

    info!("keep-alive stopped");
}
