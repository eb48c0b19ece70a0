//! Lifecycle coordinator: the guarded bot state machine.
//!
//! ```text
//! Stopped --start--> Starting --(handshake ok)--> Running --stop--> Stopping --> Stopped
//!                       |
//!                       +--(handshake failed or start dropped)--> Stopped
//! ```
//!
//! `stop` drains the poller before leaving `Running`.
//!
//! `start` and `stop` serialize on one async mutex held for the whole
//! transition. The state itself is an atomic so ingestion paths can read it
//! without waiting on a transition in flight. The session pointer sits behind
//! a read-write lock; submissions only take the read side long enough to clone
//! the `Arc`.

mod poller;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError, Credentials, Mode};
use crate::database::{Database, DatabaseError};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::handlers::UpdateHandler;
use crate::session::Session;
use crate::transport::{BotIdentity, Connection, Delivery, Transport, TransportError};
use crate::update::Update;

use poller::PollerHandle;

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Required configuration is missing or invalid; start never proceeds.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The platform rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Handshake, network or database failure during start.
    #[error("connection failed: {0}")]
    Connection(String),
    /// An update was submitted while the bot is not running.
    #[error("bot is not running")]
    NotRunning,
    /// The handler pipeline failed on a submitted update.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<TransportError> for LifecycleError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Auth(reason) => Self::Auth(reason),
            TransportError::Connection(reason) => Self::Connection(reason),
            TransportError::Closed => Self::Connection("connection closed".to_owned()),
        }
    }
}

impl From<DatabaseError> for LifecycleError {
    fn from(e: DatabaseError) -> Self {
        Self::Connection(format!("database unavailable: {e}"))
    }
}

/// Bot lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    /// No session.
    Stopped = 0,
    /// Session being opened.
    Starting = 1,
    /// Accepting updates.
    Running = 2,
    /// Session being torn down.
    Stopping = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    /// Lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition-only state guarded by the transition mutex.
#[derive(Default)]
struct Transitions {
    poller: Option<PollerHandle>,
}

/// Process-scoped bot context shared by both ingestion entry points.
///
/// Construct once, wrap in an `Arc`, and hand clones to the HTTP server and
/// the process entry point.
pub struct Lifecycle {
    config: Config,
    mode: Mode,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    state: AtomicU8,
    session: RwLock<Option<Arc<Session>>>,
    transitions: Mutex<Transitions>,
}

impl Lifecycle {
    /// Build a stopped coordinator. The mode is taken from `config` and never
    /// changes afterwards.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn UpdateHandler>,
    ) -> Self {
        Self {
            mode: config.telegram.mode,
            config,
            transport,
            dispatcher: Dispatcher::new(handler),
            state: AtomicU8::new(LifecycleState::Stopped as u8),
            session: RwLock::new(None),
            transitions: Mutex::new(Transitions::default()),
        }
    }

    /// Active transport mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether updates are accepted right now. Never blocks.
    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// The live session, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Identity of the running bot.
    pub fn identity(&self) -> Option<BotIdentity> {
        self.session().map(|s| s.identity().clone())
    }

    fn set_state(&self, state: LifecycleState) {
        let previous = LifecycleState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        debug!(from = %previous, to = %state, "lifecycle transition");
    }

    fn replace_session(&self, session: Option<Arc<Session>>) -> Option<Arc<Session>> {
        let mut slot = self.session.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *slot, session)
    }

    /// Start the bot. No-op when already running.
    ///
    /// Opens the connection, fetches the identity, opens the database and
    /// points platform delivery at the configured mode. In polling mode the
    /// poller is spawned once the state is `Running`.
    ///
    /// Cancel-safe: dropping the future mid-start puts the state back to
    /// `Stopped` and releases whatever was already opened.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Config`] for missing credentials,
    /// [`LifecycleError::Auth`] for rejected credentials and
    /// [`LifecycleError::Connection`] for network or database failures. On
    /// any error the state is back to `Stopped` and nothing stays open.
    pub async fn start(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let mut transitions = self.transitions.lock().await;

        match self.state() {
            LifecycleState::Running | LifecycleState::Starting => {
                debug!("start ignored, bot already running");
                return Ok(());
            }
            LifecycleState::Stopped | LifecycleState::Stopping => {}
        }

        self.config.validate()?;
        let credentials = self.config.credentials()?;

        // Leftovers of a stop that was cancelled half way.
        if let Some(poller) = transitions.poller.take() {
            poller.shutdown().await;
        }
        if let Some(stale) = self.replace_session(None) {
            stale.close().await;
        }

        self.set_state(LifecycleState::Starting);
        info!(mode = %self.mode, "starting bot");

        let mut staged = StartRollback::new(self);
        let session = match self.open_session(&mut staged, credentials).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                staged.rollback().await;
                warn!(error = %e, "bot failed to start");
                return Err(e);
            }
        };

        let identity = session.identity();
        info!(
            first_name = %identity.first_name,
            username = identity.username.as_deref().unwrap_or(""),
            "bot started as {}",
            identity.first_name
        );

        self.replace_session(Some(Arc::clone(&session)));
        self.set_state(LifecycleState::Running);
        staged.disarm();

        if self.mode == Mode::Polling {
            transitions.poller = Some(poller::spawn(
                Arc::clone(self),
                Arc::clone(session.connection()),
            ));
        }

        Ok(())
    }

    /// Stop the bot. No-op when already stopped, safe after a failed start.
    ///
    /// The poller is drained first, while the state is still `Running`, so
    /// an update it already pulled is dispatched rather than dropped. Only
    /// then does the state move to `Stopping` and the session close.
    pub async fn stop(&self) {
        let mut transitions = self.transitions.lock().await;

        if self.state() == LifecycleState::Stopped {
            debug!("stop ignored, bot already stopped");
            return;
        }

        if let Some(poller) = transitions.poller.take() {
            poller.shutdown().await;
        }

        self.set_state(LifecycleState::Stopping);

        if let Some(session) = self.replace_session(None) {
            session.close().await;
        }

        self.set_state(LifecycleState::Stopped);
        info!("bot stopped");
    }

    /// Dispatch one update from either ingestion path.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NotRunning`] unless the state is `Running`;
    /// [`LifecycleError::Dispatch`] when the handler fails.
    pub async fn submit(&self, update: Update) -> Result<(), LifecycleError> {
        if !self.is_running() {
            return Err(LifecycleError::NotRunning);
        }
        let session = self.session().ok_or(LifecycleError::NotRunning)?;
        self.dispatcher.dispatch(&session, update).await?;
        Ok(())
    }

    async fn open_session(
        &self,
        staged: &mut StartRollback<'_>,
        credentials: Credentials,
    ) -> Result<Session, LifecycleError> {
        let connection = self.transport.connect(&credentials).await?;
        staged.connection = Some(Arc::clone(&connection));

        let identity = connection.get_me().await?;

        let database = Database::open(&self.config.database.url).await?;
        staged.database = Some(database.clone());

        connection.configure(&self.delivery()).await?;

        Ok(Session::new(
            credentials,
            connection,
            identity,
            database,
            self.mode,
        ))
    }

    fn delivery(&self) -> Delivery {
        match self.mode {
            Mode::Polling => Delivery::Polling,
            Mode::Webhook => Delivery::Webhook {
                url: self.config.telegram.webhook_url.clone(),
                secret: self.config.telegram.webhook_secret.clone(),
            },
        }
    }
}

/// Undo for a start in progress.
///
/// Holds what the start has opened so far. Disarmed once the state is
/// `Running`; otherwise the start either failed ([`StartRollback::rollback`])
/// or its future was dropped, in which case `Drop` resets the state and
/// releases the resources on a background task.
struct StartRollback<'a> {
    lifecycle: &'a Lifecycle,
    connection: Option<Arc<dyn Connection>>,
    database: Option<Database>,
    armed: bool,
}

impl<'a> StartRollback<'a> {
    fn new(lifecycle: &'a Lifecycle) -> Self {
        Self {
            lifecycle,
            connection: None,
            database: None,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
        self.connection = None;
        self.database = None;
    }

    async fn rollback(mut self) {
        self.armed = false;
        release(self.connection.take(), self.database.take()).await;
        self.lifecycle.set_state(LifecycleState::Stopped);
    }
}

impl Drop for StartRollback<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.lifecycle.set_state(LifecycleState::Stopped);
        warn!("bot start cancelled, rolled back to stopped");

        let connection = self.connection.take();
        let database = self.database.take();
        if connection.is_none() && database.is_none() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release(connection, database));
            }
            Err(_) => warn!("no runtime to release a cancelled start"),
        }
    }
}

async fn release(connection: Option<Arc<dyn Connection>>, database: Option<Database>) {
    if let Some(database) = database {
        database.close().await;
    }
    if let Some(connection) = connection {
        connection.disconnect().await;
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
