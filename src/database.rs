//! SQLite persistence handle held by the bot session.
//!
//! Opened once per start and closed on stop. Handlers reach it through
//! [`crate::session::Session::database`]. The only table owned here is the
//! inbound update journal; business tables belong to handlers.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

use crate::update::Update;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The connection URL could not be parsed.
    #[error("invalid database URL: {0}")]
    InvalidUrl(String),
    /// Any driver-level failure.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Shared SQLite pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and create the update journal table if missing.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError`] when the URL is invalid, the file cannot be
    /// opened, or the schema statement fails.
    pub async fn open(url: &str) -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DatabaseError::InvalidUrl(e.to_string()))?
            .create_if_missing(true);

        // In-memory databases are per-connection, so pin exactly one.
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options.connect_with(options).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS inbound_updates (\
                 event_id TEXT PRIMARY KEY, \
                 update_id INTEGER, \
                 kind TEXT NOT NULL, \
                 chat_id INTEGER, \
                 received_at TEXT NOT NULL\
             )",
        )
        .execute(&pool)
        .await?;

        // One row per platform update. NULL ids stay distinct.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_inbound_updates_update_id \
             ON inbound_updates (update_id)",
        )
        .execute(&pool)
        .await?;

        info!("database opened");
        Ok(Self { pool })
    }

    /// Underlying pool for handler queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Journal one inbound update.
    ///
    /// Returns `false` when a row with the same `update_id` already exists;
    /// the insert and the duplicate check are one statement, so concurrent
    /// redeliveries journal exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlx`] if the insert fails.
    pub async fn record_update(&self, update: &Update) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO inbound_updates (event_id, update_id, kind, chat_id, received_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(update.event_id().to_string())
        .bind(update.update_id())
        .bind(update.kind().as_str())
        .bind(update.chat_id())
        .bind(update.received_at().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        debug!(event_id = %update.event_id(), inserted, "update journaled");
        Ok(inserted)
    }

    /// Number of journaled updates.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlx`] if the query fails.
    pub async fn update_count(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM inbound_updates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Whether an update with this platform id was already journaled.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlx`] if the query fails.
    pub async fn has_update_id(&self, update_id: i64) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM inbound_updates WHERE update_id = ?1 LIMIT 1")
                .bind(update_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("database closed");
    }
}
