//! Async game session over a shared [`DocumentStore`].
//!
//! [`GameSession`] is a thin handle that communicates with a background session
//! loop via an unbounded MPSC channel. The loop owns the subscription to the game
//! document, the [`RoundMachine`], and the local countdown; it emits
//! [`GameEvent`]s on the bounded channel returned from [`GameSession::create`],
//! [`GameSession::join`] and [`GameSession::rejoin`].
//!
//! # Example
//!
//! ```rust,ignore
//! let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
//! let (host, mut events) = GameSession::create(
//!     Arc::clone(&store),
//!     SessionConfig::new(),
//!     CreateParams::new("Ana", "Food Fights").with_total_rounds(5),
//! )
//! .await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GameEvent::Playing(view) => host.choose(Choice::A)?,
//!         GameEvent::Reveal(view) if view.can_advance => host.advance()?,
//!         GameEvent::Closed { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::content;
use crate::countdown::{Countdown, Tick, DEFAULT_COUNTDOWN_SECS};
use crate::document::{
    new_player_id, Choice, GameCode, GameDocument, Phase, PlayerId, PlayerSlot, Role, Seat, PHASE,
};
use crate::error::{Result, WyrError};
use crate::event::GameEvent;
use crate::machine::{reveal_ready, start_ready, Effect, RoundMachine};
use crate::store::{join_path, DocumentStore, Subscription, UpdateBatch};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default root path under which game documents live.
pub const DEFAULT_STORE_ROOT: &str = "wyr-games";

/// Default number of rounds in a new game.
pub const DEFAULT_TOTAL_ROUNDS: usize = 10;

const DEFAULT_START_DELAY: Duration = Duration::from_millis(1500);
const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(800);
const DEFAULT_TIMEOUT_REVEAL_DELAY: Duration = Duration::from_millis(1200);
const TICK: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`GameSession`].
///
/// Everything has a default; the player id is freshly generated unless a
/// persisted one is supplied with [`with_player_id`](Self::with_player_id).
///
/// # Example
///
/// ```
/// use wyr_client::session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::new()
///     .with_store_root("party/wyr")
///     .with_countdown_secs(5)
///     .with_shutdown_timeout(Duration::from_secs(2));
/// assert_eq!(config.store_root, "party/wyr");
/// assert_eq!(config.countdown_secs, 5);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifies this device in the game document.
    ///
    /// Persist it to let [`GameSession::rejoin`] find this device's seat again.
    pub player_id: PlayerId,
    /// Page that hosts the join form. When set, sessions expose a join URL
    /// carrying the game code as `?code=`.
    pub join_base_url: Option<Url>,
    /// Store path under which game documents are kept. Defaults to `"wyr-games"`.
    pub store_root: String,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) rather than stalling the session loop. The `Closed` event is
    /// always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**. A zero timeout aborts the session loop
    /// immediately.
    pub shutdown_timeout: Duration,
    /// Grace period between the guest appearing and the host's start
    /// promotion. Defaults to **1.5 s**.
    pub start_delay: Duration,
    /// Delay between observing both choices and the reveal promotion.
    /// Defaults to **800 ms**.
    pub reveal_delay: Duration,
    /// Delay between an auto-pick and the reveal promotion, letting the write
    /// propagate. Defaults to **1.2 s**.
    pub timeout_reveal_delay: Duration,
    /// Countdown length once one player has locked in. Defaults to **10**.
    pub countdown_secs: u32,
}

impl SessionConfig {
    /// Create a configuration with a fresh player id and default values.
    pub fn new() -> Self {
        Self {
            player_id: new_player_id(),
            join_base_url: None,
            store_root: DEFAULT_STORE_ROOT.to_string(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            start_delay: DEFAULT_START_DELAY,
            reveal_delay: DEFAULT_REVEAL_DELAY,
            timeout_reveal_delay: DEFAULT_TIMEOUT_REVEAL_DELAY,
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
        }
    }

    /// Use a persisted player id.
    #[must_use]
    pub fn with_player_id(mut self, player_id: PlayerId) -> Self {
        self.player_id = player_id;
        self
    }

    /// Set the page that hosts the join form.
    #[must_use]
    pub fn with_join_base_url(mut self, url: Url) -> Self {
        self.join_base_url = Some(url);
        self
    }

    /// Set the store path under which game documents are kept.
    #[must_use]
    pub fn with_store_root(mut self, root: impl Into<String>) -> Self {
        self.store_root = root.into();
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the start grace delay.
    #[must_use]
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Set the delay before a reveal promotion.
    #[must_use]
    pub fn with_reveal_delay(mut self, delay: Duration) -> Self {
        self.reveal_delay = delay;
        self
    }

    /// Set the delay before the reveal promotion that follows an auto-pick.
    #[must_use]
    pub fn with_timeout_reveal_delay(mut self, delay: Duration) -> Self {
        self.timeout_reveal_delay = delay;
        self
    }

    /// Set the countdown length. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_countdown_secs(mut self, secs: u32) -> Self {
        self.countdown_secs = secs.max(1);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Params ──────────────────────────────────────────────────────────

/// Parameters for creating a game.
///
/// ```
/// use wyr_client::session::CreateParams;
///
/// let params = CreateParams::new("Ana", "Tech").with_total_rounds(5);
/// assert_eq!(params.total_rounds, 5);
/// ```
#[derive(Debug, Clone)]
pub struct CreateParams {
    /// Host display name.
    pub name: String,
    /// Topic from [`content::topic_names`].
    pub topic: String,
    /// Number of rounds, at least 1. Defaults to **10**.
    pub total_rounds: usize,
}

impl CreateParams {
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            total_rounds: DEFAULT_TOTAL_ROUNDS,
        }
    }

    /// Set the number of rounds.
    #[must_use]
    pub fn with_total_rounds(mut self, total_rounds: usize) -> Self {
        self.total_rounds = total_rounds;
        self
    }
}

/// Parameters for joining a game.
#[derive(Debug, Clone)]
pub struct JoinParams {
    /// Guest display name.
    pub name: String,
    /// The 4-digit code, as typed.
    pub code: String,
}

impl JoinParams {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

// ── Join links ──────────────────────────────────────────────────────

/// `base` with its query replaced by `?code=<code>`.
pub fn join_url(base: &Url, code: &GameCode) -> Url {
    let mut url = base.clone();
    url.set_fragment(None);
    url.set_query(Some(&format!("code={code}")));
    url
}

/// Extract a game code from a join link, if it carries a valid one.
///
/// ```
/// use wyr_client::session::parse_join_url;
///
/// let code = parse_join_url("https://play.example/wyr/?code=4821").unwrap();
/// assert_eq!(code.as_str(), "4821");
/// assert!(parse_join_url("https://play.example/wyr/?code=48").is_none());
/// ```
pub fn parse_join_url(input: &str) -> Option<GameCode> {
    let url = Url::parse(input).ok()?;
    let (_, code) = url.query_pairs().find(|(key, _)| key == "code")?;
    GameCode::parse(&code).ok()
}

/// Text inviting a friend to join.
pub fn invite_message(code: &GameCode, join_url: Option<&Url>) -> String {
    let mut message = format!("🤔 Would You Rather?\n\nJoin my game! Code: {code}");
    if let Some(url) = join_url {
        message.push('\n');
        message.push_str(url.as_str());
    }
    message
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the session handle and the session loop.
struct SessionState {
    open: AtomicBool,
    latest: Mutex<Option<GameDocument>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            latest: Mutex::new(None),
        }
    }
}

/// Player actions queued to the session loop.
#[derive(Debug)]
enum Command {
    Choose(Choice),
    Advance,
    PlayAgain,
}

// ── Session handle ──────────────────────────────────────────────────

/// Handle to one device's participation in one game.
///
/// Created via [`create`](Self::create), [`join`](Self::join) or
/// [`rejoin`](Self::rejoin), each of which spawns a background session loop and
/// returns this handle together with an event receiver.
///
/// Action methods queue a command and return immediately. Store failures while
/// carrying an action out are reported as [`GameEvent::Error`].
pub struct GameSession {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<SessionState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
    code: GameCode,
    role: Role,
    player_id: PlayerId,
    join_url: Option<Url>,
}

impl GameSession {
    /// Create a new game as host.
    ///
    /// Generates the rounds and a fresh 4-digit code, writes the initial
    /// document and subscribes to it. Code collisions are not checked.
    ///
    /// # Errors
    ///
    /// - [`WyrError::UnknownTopic`] / [`WyrError::InvalidRoundCount`] for bad params.
    /// - [`WyrError::WriteFailure`] if the initial document was rejected.
    /// - [`WyrError::ReadFailure`] if the subscription could not be opened.
    pub async fn create(
        store: Arc<dyn DocumentStore>,
        config: SessionConfig,
        params: CreateParams,
    ) -> Result<(Self, mpsc::Receiver<GameEvent>)> {
        let rounds = content::generate_rounds(&params.topic, params.total_rounds)?;
        let code = GameCode::generate(&mut rand::rng());
        let base = code.document_path(&config.store_root);

        let host = PlayerSlot::new(config.player_id, params.name);
        let doc = GameDocument::new(params.topic, rounds, host, now_millis());
        store.write(&base, doc.to_snapshot()?).await?;
        info!(%code, topic = %doc.topic, rounds = doc.total_rounds, "game created");

        Self::attach(store, config, code, Role::Host, &doc).await
    }

    /// Join an existing game as guest.
    ///
    /// The document is read once; nothing is written unless the guest seat is
    /// free. Taking the seat and starting play happen in one atomic update.
    ///
    /// # Errors
    ///
    /// - [`WyrError::InvalidGameCode`] if the code is not 4 digits.
    /// - [`WyrError::GameNotFound`] if no game exists under the code.
    /// - [`WyrError::GameFull`] if the guest seat is taken.
    /// - [`WyrError::WriteFailure`] if the update was rejected.
    pub async fn join(
        store: Arc<dyn DocumentStore>,
        config: SessionConfig,
        params: JoinParams,
    ) -> Result<(Self, mpsc::Receiver<GameEvent>)> {
        let code = GameCode::parse(&params.code)?;
        let base = code.document_path(&config.store_root);

        let Some(value) = store.read(&base).await? else {
            return Err(WyrError::GameNotFound { code });
        };
        let mut doc = GameDocument::from_snapshot(value)?;
        if doc.player2.is_some() {
            return Err(WyrError::GameFull { code });
        }

        let guest = PlayerSlot::new(config.player_id, params.name);
        let batch = UpdateBatch::new(&base)
            .set(Seat::Player2.key(), serde_json::to_value(&guest)?)
            .set(PHASE, json!(Phase::Playing));
        store.update(batch).await?;
        info!(%code, "joined game");

        doc.player2 = Some(guest);
        doc.phase = Phase::Playing;
        Self::attach(store, config, code, Role::Guest, &doc).await
    }

    /// Re-attach to a game this device is already seated in, e.g. after a
    /// restart. The seat is found by matching [`SessionConfig::player_id`];
    /// the view is rebuilt entirely from the current document.
    ///
    /// # Errors
    ///
    /// - [`WyrError::InvalidGameCode`] if the code is not 4 digits.
    /// - [`WyrError::GameNotFound`] if no game exists under the code.
    /// - [`WyrError::NotAPlayer`] if this device holds neither seat.
    pub async fn rejoin(
        store: Arc<dyn DocumentStore>,
        config: SessionConfig,
        code: &str,
    ) -> Result<(Self, mpsc::Receiver<GameEvent>)> {
        let code = GameCode::parse(code)?;
        let base = code.document_path(&config.store_root);

        let Some(value) = store.read(&base).await? else {
            return Err(WyrError::GameNotFound { code });
        };
        let doc = GameDocument::from_snapshot(value)?;
        let role = match doc.seat_of(config.player_id) {
            Some(Seat::Player1) => Role::Host,
            Some(Seat::Player2) => Role::Guest,
            None => return Err(WyrError::NotAPlayer { code }),
        };
        info!(%code, ?role, "rejoined game");

        Self::attach(store, config, code, role, &doc).await
    }

    /// Subscribe to the document and spawn the session loop.
    async fn attach(
        store: Arc<dyn DocumentStore>,
        config: SessionConfig,
        code: GameCode,
        role: Role,
        doc: &GameDocument,
    ) -> Result<(Self, mpsc::Receiver<GameEvent>)> {
        let base = code.document_path(&config.store_root);
        let subscription = store.subscribe(&base).await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<GameEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(SessionState::new());
        let join_url = config.join_base_url.as_ref().map(|url| join_url(url, &code));

        let greeting = vec![
            GameEvent::Attached {
                code: code.clone(),
                role,
                join_url: join_url.clone(),
            },
            GameEvent::Prefetch {
                urls: content::prefetch_urls(&doc.rounds, &doc.topic),
            },
        ];

        let session_loop = SessionLoop {
            store,
            base,
            machine: RoundMachine::new(role),
            countdown: Countdown::new(config.countdown_secs),
            events: event_tx,
            state: Arc::clone(&state),
            timings: Timings::from(&config),
            start_at: None,
            reveal_at: None,
            tick_at: None,
        };
        let task = tokio::spawn(session_loop.run(greeting, subscription, cmd_rx, shutdown_rx));

        let session = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            code,
            role,
            player_id: config.player_id,
            join_url,
        };
        Ok((session, event_rx))
    }

    // ── Player actions ──────────────────────────────────────────────

    /// Lock in a choice for the current round.
    ///
    /// Ignored outside `playing` or when this player already chose this round.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::SessionClosed`] if the session loop has exited.
    pub fn choose(&self, choice: Choice) -> Result<()> {
        self.send(Command::Choose(choice))
    }

    /// Host only: record the revealed round and move on to the next round or
    /// the finale.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::NotHost`] for the guest and
    /// [`WyrError::SessionClosed`] if the session loop has exited.
    pub fn advance(&self) -> Result<()> {
        self.authorize_host()?;
        self.send(Command::Advance)
    }

    /// Host only: delete the finished game so a new one can be created.
    ///
    /// Both sessions end with [`GameEvent::GameDeleted`] followed by
    /// [`GameEvent::Closed`]. Ignored before the finale.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::NotHost`] for the guest and
    /// [`WyrError::SessionClosed`] if the session loop has exited.
    pub fn play_again(&self) -> Result<()> {
        self.authorize_host()?;
        self.send(Command::PlayAgain)
    }

    /// Shut down the session loop.
    ///
    /// The game document is left as is. After this returns, the event receiver
    /// yields `None` once the remaining events are drained.
    pub async fn shutdown(&mut self) {
        debug!("GameSession: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.open.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn code(&self) -> &GameCode {
        &self.code
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Link that pre-fills the join form, if a join base URL was configured.
    pub fn join_url(&self) -> Option<&Url> {
        self.join_url.as_ref()
    }

    /// Text inviting a friend to this game.
    pub fn invite_message(&self) -> String {
        invite_message(&self.code, self.join_url.as_ref())
    }

    /// Returns `true` while the session loop is running.
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }

    /// The most recent document snapshot the session loop has seen.
    pub async fn snapshot(&self) -> Option<GameDocument> {
        self.state.latest.lock().await.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Single gate for every host-only mutation. Nothing in the store enforces
    /// this; the guest simply never issues these writes.
    fn authorize_host(&self) -> Result<()> {
        if self.role.is_host() {
            Ok(())
        } else {
            Err(WyrError::NotHost)
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        if !self.state.open.load(Ordering::Acquire) {
            return Err(WyrError::SessionClosed);
        }
        self.cmd_tx
            .send(command)
            .map_err(|_| WyrError::SessionClosed)
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("code", &self.code)
            .field("role", &self.role)
            .field("open", &self.is_open())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        // Drop cannot await a graceful shutdown; aborting drops the loop future.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn now_millis() -> Option<u64> {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?;
    u64::try_from(elapsed.as_millis()).ok()
}

#[cfg(target_arch = "wasm32")]
fn now_millis() -> Option<u64> {
    None
}

// ── Session loop ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Timings {
    start: Duration,
    reveal: Duration,
    timeout_reveal: Duration,
}

impl From<&SessionConfig> for Timings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            start: config.start_delay,
            reveal: config.reveal_delay,
            timeout_reveal: config.timeout_reveal_delay,
        }
    }
}

/// Everything the session loop owns.
struct SessionLoop {
    store: Arc<dyn DocumentStore>,
    /// Absolute path of the game document.
    base: String,
    machine: RoundMachine,
    countdown: Countdown,
    events: mpsc::Sender<GameEvent>,
    state: Arc<SessionState>,
    timings: Timings,
    /// Pending `waiting → playing` promotion.
    start_at: Option<Instant>,
    /// Pending `playing → reveal` promotion.
    reveal_at: Option<Instant>,
    /// Next countdown tick.
    tick_at: Option<Instant>,
}

impl SessionLoop {
    /// Multiplexes commands, shutdown, snapshots and timers via `tokio::select!`.
    ///
    /// Exits when:
    /// - The shutdown signal fires or the command channel closes
    /// - The game document is deleted
    /// - The subscription ends
    async fn run(
        mut self,
        greeting: Vec<GameEvent>,
        mut subscription: Subscription,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!(path = %self.base, "session loop started");
        for event in greeting {
            self.emit(event);
        }

        let reason = loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    break Some("session shut down".to_string());
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(command) => self.on_command(command).await,
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        break Some("session shut down".to_string());
                    }
                },

                snapshot = subscription.recv() => match snapshot {
                    Some(Some(value)) => self.on_value(value).await,
                    Some(None) => {
                        info!(path = %self.base, "game document deleted");
                        self.emit(GameEvent::GameDeleted);
                        break Some("game deleted".to_string());
                    }
                    None => {
                        debug!("subscription ended");
                        break None;
                    }
                },

                () = sleep_until(self.tick_at) => self.on_tick().await,

                () = sleep_until(self.start_at) => {
                    self.start_at = None;
                    self.promote_start().await;
                }

                () = sleep_until(self.reveal_at) => {
                    self.reveal_at = None;
                    self.promote_reveal().await;
                }
            }
        };

        self.close(reason).await;
        debug!("session loop exited");
    }

    async fn on_command(&mut self, command: Command) {
        debug!(?command, "command received");
        match command {
            Command::Choose(choice) => {
                self.lock_choice(choice, false).await;
            }
            Command::Advance => self.advance().await,
            Command::PlayAgain => self.play_again().await,
        }
    }

    async fn on_value(&mut self, value: Value) {
        let doc = match GameDocument::from_snapshot(value) {
            Ok(doc) => doc,
            Err(err) => {
                warn!("failed to decode game document: {err}");
                self.report(err);
                return;
            }
        };
        *self.state.latest.lock().await = Some(doc.clone());

        for effect in self.machine.on_snapshot(doc) {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Emit(event) => self.emit(event),
            Effect::ScheduleStart => {
                debug!(delay = ?self.timings.start, "start promotion scheduled");
                self.start_at = Some(Instant::now() + self.timings.start);
            }
            Effect::ScheduleReveal { round } => {
                debug!(round, delay = ?self.timings.reveal, "reveal promotion scheduled");
                self.schedule_reveal(self.timings.reveal);
            }
            Effect::StartCountdown => {
                if self.countdown.start() {
                    self.tick_at = Some(Instant::now() + TICK);
                    self.emit(GameEvent::CountdownStarted {
                        seconds: self.countdown.length(),
                    });
                }
            }
            Effect::ResetCountdown => {
                if self.countdown.reset() {
                    self.tick_at = None;
                    self.emit(GameEvent::CountdownReset);
                }
            }
        }
    }

    /// Keep whichever pending reveal promotion fires first.
    fn schedule_reveal(&mut self, delay: Duration) {
        let at = Instant::now() + delay;
        self.reveal_at = Some(self.reveal_at.map_or(at, |pending| pending.min(at)));
    }

    async fn on_tick(&mut self) {
        match self.countdown.tick() {
            Tick::Remaining { seconds, urgent } => {
                self.tick_at = self.tick_at.map(|at| at + TICK);
                self.emit(GameEvent::CountdownTick {
                    remaining: seconds,
                    urgent,
                });
            }
            Tick::Expired => {
                self.tick_at = None;
                self.emit(GameEvent::CountdownTick {
                    remaining: 0,
                    urgent: true,
                });
                self.on_expired().await;
            }
            Tick::Idle => self.tick_at = None,
        }
    }

    /// Countdown hit zero: pick for the local player if they haven't, then
    /// re-check for a reveal once the write has had time to land.
    async fn on_expired(&mut self) {
        if !self.machine.has_chosen() {
            let choice = Choice::random(&mut rand::rng());
            info!(?choice, "countdown expired; choosing at random");
            if self.lock_choice(choice, true).await {
                self.emit(GameEvent::AutoPicked { choice });
            }
        }
        self.schedule_reveal(self.timings.timeout_reveal);
    }

    /// Write the local choice. Returns whether a write was issued and accepted.
    async fn lock_choice(&mut self, choice: Choice, random: bool) -> bool {
        let Some(batch) = self.machine.choice_batch(&self.base, choice, random) else {
            debug!(?choice, "choice ignored");
            return false;
        };
        match self.store.update(batch).await {
            Ok(()) => true,
            Err(err) => {
                error!("failed to write choice: {err}");
                self.machine.forget_choice();
                self.report(err);
                false
            }
        }
    }

    async fn advance(&mut self) {
        let batch = match self.machine.advance_batch(&self.base) {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                debug!("advance ignored");
                return;
            }
            Err(err) => {
                self.report(err);
                return;
            }
        };
        if let Err(err) = self.store.update(batch).await {
            error!("failed to advance round: {err}");
            self.machine.forget_advance();
            self.report(err);
        }
    }

    async fn play_again(&mut self) {
        let in_finale = self
            .machine
            .document()
            .is_some_and(|doc| doc.phase == Phase::Finale);
        if !in_finale {
            debug!("play again ignored before finale");
            return;
        }
        if let Err(err) = self.store.delete(&self.base).await {
            error!("failed to delete game: {err}");
            self.report(err);
        }
    }

    async fn promote_start(&mut self) {
        let Some(doc) = self.reread().await else {
            return;
        };
        if !start_ready(&doc) {
            debug!(phase = ?doc.phase, "start promotion no longer applies");
            return;
        }
        self.write_phase(Phase::Playing).await;
    }

    /// Confirm both choices against a fresh read before promoting. Both peers
    /// may still race past the check; writing the same phase twice is harmless.
    async fn promote_reveal(&mut self) {
        let Some(doc) = self.reread().await else {
            return;
        };
        if !reveal_ready(&doc) {
            debug!(phase = ?doc.phase, "reveal promotion no longer applies");
            return;
        }
        self.write_phase(Phase::Reveal).await;
    }

    async fn reread(&mut self) -> Option<GameDocument> {
        let value = match self.store.read(&self.base).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(err) => {
                error!("failed to re-read game: {err}");
                self.report(err);
                return None;
            }
        };
        match GameDocument::from_snapshot(value) {
            Ok(doc) => Some(doc),
            Err(err) => {
                self.report(err);
                None
            }
        }
    }

    async fn write_phase(&mut self, phase: Phase) {
        debug!(?phase, "promoting phase");
        if let Err(err) = self.store.write(&join_path(&self.base, PHASE), json!(phase)).await {
            error!("failed to promote phase: {err}");
            self.report(err);
        }
    }

    fn report(&self, err: WyrError) {
        self.emit(GameEvent::Error {
            code: err.code(),
            message: err.to_string(),
        });
    }

    /// Emit an event. If the channel is full, log a warning and drop the event
    /// to avoid blocking the session loop.
    fn emit(&self, event: GameEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit the final [`Closed`](GameEvent::Closed) event.
    ///
    /// Uses `send().await` because `Closed` must never be silently dropped.
    async fn close(&self, reason: Option<String>) {
        self.state.open.store(false, Ordering::Release);
        if self.events.send(GameEvent::Closed { reason }).await.is_err() {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(all(test, feature = "store-memory"))]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn config_defaults() {
        let config = SessionConfig::new();
        assert_eq!(config.store_root, "wyr-games");
        assert!(config.join_base_url.is_none());
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.start_delay, Duration::from_millis(1500));
        assert_eq!(config.reveal_delay, Duration::from_millis(800));
        assert_eq!(config.timeout_reveal_delay, Duration::from_millis(1200));
        assert_eq!(config.countdown_secs, 10);
    }

    #[test]
    fn config_clamps() {
        let config = SessionConfig::new()
            .with_event_channel_capacity(0)
            .with_countdown_secs(0);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.countdown_secs, 1);
    }

    #[test]
    fn each_config_gets_its_own_player_id() {
        assert_ne!(SessionConfig::new().player_id, SessionConfig::new().player_id);
    }

    #[test]
    fn join_url_replaces_query() {
        let base = Url::parse("https://play.example/wyr/?code=1111&x=1#top").unwrap();
        let code = GameCode::parse("4821").unwrap();
        let url = join_url(&base, &code);
        assert_eq!(url.as_str(), "https://play.example/wyr/?code=4821");
        assert_eq!(parse_join_url(url.as_str()), Some(code));
    }

    #[test]
    fn parse_join_url_rejects_junk() {
        assert!(parse_join_url("not a url").is_none());
        assert!(parse_join_url("https://play.example/").is_none());
        assert!(parse_join_url("https://play.example/?code=abcd").is_none());
    }

    #[test]
    fn invite_message_includes_code_and_link() {
        let code = GameCode::parse("4242").unwrap();
        let url = Url::parse("https://play.example/?code=4242").unwrap();
        let text = invite_message(&code, Some(&url));
        assert!(text.contains(&format!("Code: {code}")));
        assert!(text.ends_with("https://play.example/?code=4242"));
        assert!(!invite_message(&code, None).contains("https://"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_emits_attached_then_prefetch_then_waiting() {
        let config = SessionConfig::new()
            .with_join_base_url(Url::parse("https://play.example/wyr/").unwrap());
        let (mut host, mut events) = GameSession::create(
            store(),
            config,
            CreateParams::new("Ana", "Tech").with_total_rounds(3),
        )
        .await
        .unwrap();

        match events.recv().await.unwrap() {
            GameEvent::Attached {
                code,
                role,
                join_url,
            } => {
                assert_eq!(&code, host.code());
                assert_eq!(role, Role::Host);
                assert_eq!(join_url.as_ref(), host.join_url());
            }
            other => panic!("expected Attached, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            GameEvent::Prefetch { urls } => assert_eq!(urls.len(), 6),
            other => panic!("expected Prefetch, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            GameEvent::Waiting(view) => {
                assert_eq!(view.host_name, "Ana");
                assert!(view.guest_name.is_none());
            }
            other => panic!("expected Waiting, got {other:?}"),
        }

        let doc = host.snapshot().await.unwrap();
        assert_eq!(doc.total_rounds, 3);
        assert!(doc.created_at.is_some());
        assert!(host.invite_message().contains(host.code().as_str()));

        host.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn create_with_unknown_topic_fails() {
        let err = GameSession::create(store(), SessionConfig::new(), CreateParams::new("Ana", "Nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, WyrError::UnknownTopic(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_emits_closed_and_rejects_commands() {
        let (mut host, mut events) =
            GameSession::create(store(), SessionConfig::new(), CreateParams::new("Ana", "Tech"))
                .await
                .unwrap();
        assert!(host.is_open());

        host.shutdown().await;
        assert!(!host.is_open());
        assert!(matches!(host.choose(Choice::A), Err(WyrError::SessionClosed)));

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(GameEvent::Closed {
                reason: Some("session shut down".into())
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn double_shutdown_does_not_panic() {
        let (mut host, _events) =
            GameSession::create(store(), SessionConfig::new(), CreateParams::new("Ana", "Tech"))
                .await
                .unwrap();
        host.shutdown().await;
        host.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn debug_impl_for_session() {
        let (mut host, _events) =
            GameSession::create(store(), SessionConfig::new(), CreateParams::new("Ana", "Tech"))
                .await
                .unwrap();
        let debug_str = format!("{host:?}");
        assert!(debug_str.contains("GameSession"));
        assert!(debug_str.contains("Host"));
        host.shutdown().await;
    }
}
