//! Dispatch boundary between ingestion and the handler pipeline.
//!
//! Handler errors and panics stop here: they are logged as ingestion errors
//! and returned as [`DispatchError`] so the webhook can answer 500, while the
//! poller simply moves on to the next update.
//!
//! The dispatcher holds no lock. Concurrent calls run concurrently and no
//! ordering is guaranteed between them; handlers that need ordering or
//! deduplication do it themselves.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, Instrument};
use uuid::Uuid;

use crate::handlers::UpdateHandler;
use crate::session::Session;
use crate::update::Update;

/// A handler failed on one update.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The handler returned an error.
    #[error("handler failed for update {event_id}: {source}")]
    Handler {
        /// Local id of the update.
        event_id: Uuid,
        /// What the handler reported.
        #[source]
        source: anyhow::Error,
    },
    /// The handler panicked.
    #[error("handler panicked on update {event_id}: {message}")]
    Panicked {
        /// Local id of the update.
        event_id: Uuid,
        /// Panic payload, when it was a string.
        message: String,
    },
}

/// Routes updates into one [`UpdateHandler`].
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn UpdateHandler>,
}

impl Dispatcher {
    /// Wrap a handler.
    pub fn new(handler: Arc<dyn UpdateHandler>) -> Self {
        Self { handler }
    }

    /// Hand `update` to the handler, containing any failure.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the handler fails or panics. The error
    /// is already logged.
    pub async fn dispatch(&self, session: &Session, update: Update) -> Result<(), DispatchError> {
        let event_id = update.event_id();
        let span = tracing::info_span!(
            "dispatch",
            %event_id,
            kind = %update.kind(),
            update_id = ?update.update_id(),
        );

        let outcome = AssertUnwindSafe(self.handler.handle(session, update))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match outcome {
            Ok(Ok(())) => {
                debug!("update handled");
                Ok(())
            }
            Ok(Err(source)) => {
                error!(error = %source, "update handler failed");
                Err(DispatchError::Handler { event_id, source })
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "update handler panicked");
                Err(DispatchError::Panicked { event_id, message })
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
