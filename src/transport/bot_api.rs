//! Telegram Bot API transport -- async long polling over `reqwest`.
//!
//! Polls `getUpdates`, runs every element through [`normalize`], and hands the
//! results out one at a time from [`Connection::pull`]. Webhook registration
//! goes through `setWebhook`/`deleteWebhook` on the same connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{BotIdentity, Connection, Delivery, Transport, TransportError};
use crate::config::{Credentials, TelegramConfig};
use crate::update::{normalize, Update};

/// Initial backoff on poll failure, in milliseconds.
const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum backoff on poll failure, in milliseconds.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Extra seconds added to the HTTP timeout beyond the long-poll timeout,
/// so the TCP socket stays open while Telegram holds the request.
const POLL_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Timeout for every non-polling API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Generic Telegram Bot API response wrapper.
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

/// Connection factory for the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct BotApiTransport {
    client: reqwest::Client,
    api_url: String,
    poll_timeout_seconds: u32,
}

impl BotApiTransport {
    /// Create a transport against `api_url` (normally `https://api.telegram.org`).
    pub fn new(api_url: impl Into<String>, poll_timeout_seconds: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            poll_timeout_seconds,
        }
    }

    /// Create a transport from the `[telegram]` config section.
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self::new(config.api_url.clone(), config.poll_timeout_seconds)
    }
}

#[async_trait]
impl Transport for BotApiTransport {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let token = credentials.bot_token.expose_secret();
        if !is_well_formed_token(token) {
            return Err(TransportError::Auth(
                "bot token must look like `<bot id>:<secret>`".to_owned(),
            ));
        }

        let endpoint = SecretString::new(format!("{}/bot{}", self.api_url, token));
        debug!(api_url = %self.api_url, "Bot API connection created");

        Ok(Arc::new(BotApiConnection {
            client: self.client.clone(),
            endpoint,
            poll_timeout_seconds: self.poll_timeout_seconds,
            poll: Mutex::new(PollState::default()),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Structural check on a BotFather token before any network traffic.
fn is_well_formed_token(token: &str) -> bool {
    match token.split_once(':') {
        Some((id, secret)) => {
            !id.is_empty()
                && id.bytes().all(|b| b.is_ascii_digit())
                && !secret.is_empty()
                && secret
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        }
        None => false,
    }
}

#[derive(Debug, Default)]
struct PollState {
    /// Next `offset` to send; confirms everything below it.
    offset: Option<i64>,
    /// Normalized updates from the last batch not yet handed out.
    pending: VecDeque<Update>,
}

/// A live Bot API connection.
pub struct BotApiConnection {
    client: reqwest::Client,
    /// `{api_url}/bot{token}`; secret because it embeds the token.
    endpoint: SecretString,
    poll_timeout_seconds: u32,
    poll: Mutex<PollState>,
    closed: AtomicBool,
}

impl BotApiConnection {
    /// Invoke a Bot API method and unwrap its `result`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &Value,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let url = format!("{}/{method}", self.endpoint.expose_secret());

        let resp = self
            .client
            .post(&url)
            .json(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError::from(e.without_url()))?;

        let status = resp.status();
        let response: TelegramResponse<T> = resp
            .json()
            .await
            .map_err(|e| TransportError::from(e.without_url()))?;

        if !response.ok {
            let description = response
                .description
                .unwrap_or_else(|| format!("{method} failed"));
            let code = response.error_code.unwrap_or(status.as_u16());
            return Err(
                if code == StatusCode::UNAUTHORIZED.as_u16() || code == StatusCode::NOT_FOUND.as_u16()
                {
                    TransportError::Auth(description)
                } else {
                    TransportError::Connection(description)
                },
            );
        }

        response
            .result
            .ok_or_else(|| TransportError::Connection(format!("{method} returned no result")))
    }

    /// Call `getUpdates` with the current offset.
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Value>, TransportError> {
        let mut params = json!({ "timeout": self.poll_timeout_seconds });
        if let Some(off) = offset {
            params["offset"] = Value::from(off);
        }

        let http_timeout_secs =
            u64::from(self.poll_timeout_seconds).saturating_add(POLL_TIMEOUT_MARGIN_SECS);

        self.call("getUpdates", &params, Duration::from_secs(http_timeout_secs))
            .await
    }
}

#[async_trait]
impl Connection for BotApiConnection {
    async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.call("getMe", &json!({}), REQUEST_TIMEOUT).await
    }

    async fn configure(&self, delivery: &Delivery) -> Result<(), TransportError> {
        match delivery {
            Delivery::Polling => {
                let _: bool = self
                    .call(
                        "deleteWebhook",
                        &json!({ "drop_pending_updates": false }),
                        REQUEST_TIMEOUT,
                    )
                    .await?;
                info!("webhook cleared for long polling");
            }
            Delivery::Webhook { url: Some(url), secret } => {
                let mut params = json!({ "url": url });
                if let Some(secret) = secret {
                    params["secret_token"] = Value::from(secret.expose_secret().as_str());
                }
                let _: bool = self.call("setWebhook", &params, REQUEST_TIMEOUT).await?;
                info!(url = %url, "webhook registered");
            }
            Delivery::Webhook { url: None, .. } => {
                info!("no webhook URL configured, assuming it is registered externally");
            }
        }
        Ok(())
    }

    async fn pull(&self, cancel: &CancellationToken) -> Option<Update> {
        let mut state = self.poll.lock().await;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            if cancel.is_cancelled() || self.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(update) = state.pending.pop_front() {
                return Some(update);
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                result = self.get_updates(state.offset) => result,
            };

            match result {
                Ok(batch) => {
                    backoff_ms = INITIAL_BACKOFF_MS;
                    debug!(count = batch.len(), "got Telegram updates");

                    for raw in batch {
                        // Advance offset so we don't re-process this update.
                        if let Some(id) = raw.get("update_id").and_then(Value::as_i64) {
                            state.offset = Some(id.saturating_add(1));
                        }
                        match normalize(raw) {
                            Ok(update) => state.pending.push_back(update),
                            Err(e) => warn!(error = %e, "skipping malformed polled update"),
                        }
                    }
                }
                Err(e) => {
                    if matches!(e, TransportError::Auth(_)) {
                        error!(error = %e, backoff_ms, "Telegram rejected the token while polling");
                    } else {
                        warn!(error = %e, backoff_ms, "Telegram poll error, backing off");
                    }
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return None,
                        () = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                    }
                    backoff_ms = backoff_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
                }
            }
        }
    }

    async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Confirm what was handed out so a restart does not redeliver it.
        // Buffered updates that never left `pull` stay unconfirmed.
        let ack = {
            let state = self.poll.lock().await;
            state
                .pending
                .front()
                .and_then(Update::update_id)
                .or(state.offset)
        };

        if let Some(offset) = ack {
            let params = json!({ "offset": offset, "timeout": 0, "limit": 1 });
            match self
                .call::<Vec<Value>>("getUpdates", &params, REQUEST_TIMEOUT)
                .await
            {
                Ok(_) => debug!(offset, "acknowledged polling offset"),
                Err(e) => warn!(error = %e, offset, "failed to acknowledge polling offset"),
            }
        }

        info!("Bot API connection closed");
    }
}
