//! Polling ingestion loop.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use super::{Lifecycle, LifecycleError};
use crate::transport::Connection;

/// Handle to a spawned poller.
pub(super) struct PollerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal the loop and wait for it to exit.
    pub(super) async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            error!(error = %e, "polling task ended abnormally");
        }
    }
}

/// Spawn the poller on its own task.
pub(super) fn spawn(lifecycle: Arc<Lifecycle>, connection: Arc<dyn Connection>) -> PollerHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let join = tokio::spawn(
        run(lifecycle, connection, token).instrument(tracing::info_span!("poller")),
    );
    PollerHandle { cancel, join }
}

async fn run(lifecycle: Arc<Lifecycle>, connection: Arc<dyn Connection>, cancel: CancellationToken) {
    info!("polling loop started");

    while lifecycle.is_running() {
        let Some(update) = connection.pull(&cancel).await else {
            break;
        };

        match lifecycle.submit(update).await {
            Ok(()) => {}
            // Already logged at the dispatch boundary.
            Err(LifecycleError::Dispatch(_)) => {}
            Err(e) => {
                warn!(error = %e, "polled update dropped");
            }
        }
    }

    info!("polling loop stopped");
}
