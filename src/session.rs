//! The single live session to the platform.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{Credentials, Mode};
use crate::database::Database;
use crate::transport::{BotIdentity, Connection};

/// Everything a started bot holds: credentials, connection, identity and the
/// database handle.
///
/// Created by [`crate::lifecycle::Lifecycle::start`] and torn down by
/// [`crate::lifecycle::Lifecycle::stop`]. Handlers borrow it while dispatching.
pub struct Session {
    credentials: Credentials,
    connection: Arc<dyn Connection>,
    identity: BotIdentity,
    database: Database,
    mode: Mode,
    started_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(
        credentials: Credentials,
        connection: Arc<dyn Connection>,
        identity: BotIdentity,
        database: Database,
        mode: Mode,
    ) -> Self {
        Self {
            credentials,
            connection,
            identity,
            database,
            mode,
            started_at: Utc::now(),
        }
    }

    /// The bot's own identity.
    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    /// Persistence handle.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Mode the session was started in.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Platform API identifier this session authenticated with.
    pub fn api_id(&self) -> i64 {
        self.credentials.api_id
    }

    /// When the session reached `Running`.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Close the connection and the database.
    pub(crate) async fn close(&self) {
        self.connection.disconnect().await;
        self.database.close().await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("mode", &self.mode)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}
