//! Handler pipeline seam.
//!
//! Business handlers live behind [`UpdateHandler`]; the ingestion core only
//! knows this trait. [`JournalHandler`] is the default pipeline the binary
//! installs: it drops redeliveries and journals everything else.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::session::Session;
use crate::update::Update;

/// Downstream consumer of normalized updates.
///
/// Implementations must tolerate concurrent calls. The update is passed by
/// value and never handed to any other call.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    /// Process one update against the live session.
    ///
    /// # Errors
    ///
    /// Any error is logged at the dispatch boundary and does not stop
    /// ingestion.
    async fn handle(&self, session: &Session, update: Update) -> anyhow::Result<()>;
}

/// Journals every update to the session database, skipping platform
/// redeliveries of an already-journaled `update_id`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JournalHandler;

#[async_trait]
impl UpdateHandler for JournalHandler {
    async fn handle(&self, session: &Session, update: Update) -> anyhow::Result<()> {
        // The unique index on update_id makes this one atomic step.
        if !session.database().record_update(&update).await? {
            debug!(update_id = ?update.update_id(), "duplicate delivery ignored");
            return Ok(());
        }

        info!(
            event_id = %update.event_id(),
            kind = %update.kind(),
            chat_id = ?update.chat_id(),
            "update received"
        );
        Ok(())
    }
}
