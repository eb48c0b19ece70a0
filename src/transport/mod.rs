//! Transport to the remote chat platform.
//!
//! A [`Transport`] opens [`Connection`]s; the lifecycle coordinator owns the
//! single live connection and is the only caller of `connect`/`disconnect`.
//! [`bot_api`] is the production implementation over the Telegram Bot API.

pub mod bot_api;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Credentials;
use crate::update::Update;

pub use bot_api::{BotApiConnection, BotApiTransport};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The platform rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Network failure or unexpected platform response.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The connection was already torn down.
    #[error("connection closed")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

/// Self-description of the bot, fetched once after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotIdentity {
    /// Bot user id.
    pub id: i64,
    /// Display name.
    pub first_name: String,
    /// `@` handle without the `@`.
    pub username: Option<String>,
}

/// How the platform should deliver updates for the active mode.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Clear any registered webhook so `getUpdates` works.
    Polling,
    /// Register `url` for pushes. `None` leaves registration to the operator.
    Webhook {
        /// Public HTTPS endpoint.
        url: Option<String>,
        /// Secret Telegram echoes in every push.
        secret: Option<SecretString>,
    },
}

/// Factory for connections to the platform.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection with the given credentials.
    ///
    /// # Errors
    ///
    /// [`TransportError::Auth`] for unusable credentials,
    /// [`TransportError::Connection`] for network failures.
    async fn connect(&self, credentials: &Credentials)
        -> Result<Arc<dyn Connection>, TransportError>;
}

/// One live connection to the platform.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Handshake and fetch the bot's identity.
    ///
    /// # Errors
    ///
    /// [`TransportError::Auth`] when the platform rejects the token,
    /// [`TransportError::Connection`] otherwise.
    async fn get_me(&self) -> Result<BotIdentity, TransportError>;

    /// Point platform delivery at the active mode.
    ///
    /// # Errors
    ///
    /// [`TransportError`] if the platform call fails.
    async fn configure(&self, delivery: &Delivery) -> Result<(), TransportError>;

    /// Block until the next update arrives or `cancel` fires.
    ///
    /// Returns `None` on cancellation or once the connection is closed.
    async fn pull(&self, cancel: &CancellationToken) -> Option<Update>;

    /// Release the connection. Idempotent and never fails loudly.
    async fn disconnect(&self);
}
