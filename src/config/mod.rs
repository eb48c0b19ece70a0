//! Configuration loading and validation.
//!
//! Loads settings from `./config.toml` (or `$SHAREBOT_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//! The binary reads `.env` through `dotenvy` before calling [`Config::load`].
//!
//! Precedence: env vars > config file > defaults.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value is absent from both the file and the environment.
    #[error("missing required configuration value {key}")]
    Missing {
        /// Environment variable name that supplies the value.
        key: &'static str,
    },
    /// A value is present but unusable.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Environment variable name that supplies the value.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`Config`].
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Mode ────────────────────────────────────────────────────────

/// Transport mode used to receive updates. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Long-poll `getUpdates`.
    #[default]
    Polling,
    /// Receive pushes on `POST /webhook`.
    Webhook,
}

impl Mode {
    /// Lowercase name as used in config and env.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polling" | "poll" => Ok(Self::Polling),
            "webhook" => Ok(Self::Webhook),
            other => Err(ConfigError::Invalid {
                key: "BOT_MODE",
                reason: format!("expected `polling` or `webhook`, got `{other}`"),
            }),
        }
    }
}

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Platform credentials and delivery settings (`[telegram]`).
    pub telegram: TelegramConfig,
    /// HTTP listener for liveness and webhook (`[server]`).
    pub server: ServerConfig,
    /// Persistence collaborator (`[database]`).
    pub database: DatabaseConfig,
    /// Logging outputs (`[logging]`).
    pub logging: LoggingConfig,
}

/// Telegram credentials and delivery settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Platform API identifier.
    pub api_id: Option<String>,
    /// Platform API secret.
    pub api_hash: Option<SecretString>,
    /// Bot token issued by BotFather.
    pub bot_token: Option<SecretString>,
    /// Which transport delivers updates.
    pub mode: Mode,
    /// Bot API base URL.
    pub api_url: String,
    /// Long-poll timeout for `getUpdates`, in seconds.
    pub poll_timeout_seconds: u32,
    /// Public HTTPS URL registered with `setWebhook` in webhook mode.
    pub webhook_url: Option<String>,
    /// Secret echoed back by Telegram in `X-Telegram-Bot-Api-Secret-Token`.
    pub webhook_secret: Option<SecretString>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_id: None,
            api_hash: None,
            bot_token: None,
            mode: Mode::default(),
            api_url: default_api_url(),
            poll_timeout_seconds: 30,
            webhook_url: None,
            webhook_secret: None,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Interval between keep-alive log lines, in seconds. `0` disables them.
    pub keep_alive_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            keep_alive_seconds: 300,
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sharebot.db".to_owned(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling JSON logs. Console only when unset.
    pub dir: Option<PathBuf>,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_owned()
}

// ── Credentials ─────────────────────────────────────────────────

/// Validated platform credentials. Secrets never appear in `Debug` output.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Platform API identifier.
    pub api_id: i64,
    /// Platform API secret.
    pub api_hash: SecretString,
    /// Bot token.
    pub bot_token: SecretString,
}

// ── Loading ─────────────────────────────────────────────────────

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// A missing config file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is unreadable or malformed, or an
    /// environment override cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], reading `path` instead of the default location.
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_from(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let path = Self::resolve_path(path);
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env)?;
        Ok(config)
    }

    /// Parse a TOML document, without env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// The file [`Config::load_from`] reads: `path` if given, else
    /// `$SHAREBOT_CONFIG_PATH`, else `./config.toml`.
    pub fn resolve_path(path: Option<PathBuf>) -> PathBuf {
        path.unwrap_or_else(|| Self::config_path_with(|key| std::env::var(key).ok()))
    }

    /// Resolve config file path using a custom env resolver.
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("SHAREBOT_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that do not parse.
    pub fn apply_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        // Telegram.
        if let Some(v) = env("API_ID") {
            self.telegram.api_id = Some(v);
        }
        if let Some(v) = env("API_HASH") {
            self.telegram.api_hash = Some(SecretString::new(v));
        }
        if let Some(v) = env("BOT_TOKEN") {
            self.telegram.bot_token = Some(SecretString::new(v));
        }
        if let Some(v) = env("BOT_MODE") {
            self.telegram.mode = v.parse()?;
        }
        if let Some(v) = env("TELEGRAM_API_URL") {
            self.telegram.api_url = v;
        }
        if let Some(v) = env("POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_seconds = parse_number("POLL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = env("WEBHOOK_URL") {
            self.telegram.webhook_url = Some(v);
        }
        if let Some(v) = env("WEBHOOK_SECRET") {
            self.telegram.webhook_secret = Some(SecretString::new(v));
        }

        // Server.
        if let Some(v) = env("HOST") {
            self.server.host = v;
        }
        if let Some(v) = env("PORT") {
            self.server.port = parse_number("PORT", &v)?;
        }
        if let Some(v) = env("KEEP_ALIVE_SECS") {
            self.server.keep_alive_seconds = parse_number("KEEP_ALIVE_SECS", &v)?;
        }

        // Database and logging.
        if let Some(v) = env("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = env("LOG_DIR") {
            self.logging.dir = Some(PathBuf::from(v));
        }

        Ok(())
    }

    /// Check settings that do not depend on credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unusable webhook URL or API URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.telegram.api_url).map_err(|e| ConfigError::Invalid {
            key: "TELEGRAM_API_URL",
            reason: e.to_string(),
        })?;

        if let Some(raw) = &self.telegram.webhook_url {
            let parsed = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
                key: "WEBHOOK_URL",
                reason: e.to_string(),
            })?;
            if parsed.scheme() != "https" {
                return Err(ConfigError::Invalid {
                    key: "WEBHOOK_URL",
                    reason: "webhook URL must use https".to_owned(),
                });
            }
        }

        if self.telegram.poll_timeout_seconds > 50 {
            return Err(ConfigError::Invalid {
                key: "POLL_TIMEOUT_SECS",
                reason: "long-poll timeout must be at most 50 seconds".to_owned(),
            });
        }

        Ok(())
    }

    /// Extract and validate the platform credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when any credential is absent or
    /// blank, and [`ConfigError::Invalid`] when `API_ID` is not numeric.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let api_id_raw = self
            .telegram
            .api_id
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing { key: "API_ID" })?;
        let api_id = api_id_raw
            .parse::<i64>()
            .map_err(|e| ConfigError::Invalid {
                key: "API_ID",
                reason: e.to_string(),
            })?;

        let api_hash = non_blank_secret(self.telegram.api_hash.as_ref(), "API_HASH")?;
        let bot_token = non_blank_secret(self.telegram.bot_token.as_ref(), "BOT_TOKEN")?;

        Ok(Credentials {
            api_id,
            api_hash,
            bot_token,
        })
    }
}

fn non_blank_secret(
    value: Option<&SecretString>,
    key: &'static str,
) -> Result<SecretString, ConfigError> {
    match value {
        Some(secret) if !secret.expose_secret().trim().is_empty() => Ok(secret.clone()),
        _ => Err(ConfigError::Missing { key }),
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
