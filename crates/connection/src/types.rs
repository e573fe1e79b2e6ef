//! Public types for the connection manager.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_tungstenite::tungstenite;

/// Connection state for the managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First attempt (or a restart) is in flight.
    Connecting,
    /// Socket open and relaying traffic.
    Connected,
    /// No socket and no retry pending.
    Disconnected,
    /// Connection lost, a retry is scheduled or in flight.
    Reconnecting,
    /// Retry budget exhausted; only `restart()` resumes.
    Failed,
}

impl ConnectionState {
    /// Lowercase name used in logs and UI badges.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Close information relayed to the `on_close` handler.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseEvent {
    /// WebSocket close code. 1006 is synthesized when the stream died
    /// without a close frame.
    pub code: u16,
    pub reason: String,
    /// True iff the peer actually sent a close frame.
    pub was_clean: bool,
}

/// Errors surfaced by the connection manager.
///
/// Steady-state failures flow through the `on_error` and `on_close`
/// handlers; only the initial `connect` call returns one of these
/// directly, meaning "not connected yet".
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("health check failed for {url}")]
    HealthCheck { url: String },

    #[error("connection attempt to {url} timed out")]
    Timeout { url: String },

    #[error("attempt superseded by a newer connection")]
    Superseded,
}

/// Caller-supplied callbacks, stored for the lifetime of the logical
/// connection and reused across reconnects. Every callback is optional.
#[derive(Default)]
pub struct Handlers {
    pub(crate) on_open: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) on_message: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub(crate) on_close: Option<Box<dyn Fn(&CloseEvent) + Send + Sync>>,
    pub(crate) on_error: Option<Box<dyn Fn(&ConnectionError) + Send + Sync>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per successful open, including reopens after a retry.
    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Called with the text of every inbound frame, unparsed.
    pub fn on_message(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    /// Called on every transport close, clean or not.
    pub fn on_close(mut self, f: impl Fn(&CloseEvent) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Called when the transport reports an error. Errors never schedule
    /// a retry on their own; the close path does.
    pub fn on_error(mut self, f: impl Fn(&ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub(crate) fn open(&self) {
        if let Some(f) = &self.on_open {
            f();
        }
    }

    pub(crate) fn message(&self, text: &str) {
        if let Some(f) = &self.on_message {
            f(text);
        }
    }

    pub(crate) fn close(&self, event: &CloseEvent) {
        if let Some(f) = &self.on_close {
            f(event);
        }
    }

    pub(crate) fn error(&self, err: &ConnectionError) {
        if let Some(f) = &self.on_error {
            f(err);
        }
    }
}

/// Handler set shared between the manager and a transport's pumps,
/// swapped wholesale when the caller connects with new handlers.
pub(crate) type SharedHandlers = Arc<std::sync::RwLock<Arc<Handlers>>>;

/// Clones the current handler set out of the shared cell. Callbacks are
/// invoked on the clone so no lock is held while caller code runs.
pub(crate) fn snapshot(handlers: &SharedHandlers) -> Arc<Handlers> {
    handlers.read().map(|h| Arc::clone(&h)).unwrap_or_default()
}

/// Exponential backoff configuration for automatic reconnection.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Retries allowed before the manager gives up and turns `Failed`.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_attempts: 5,
        }
    }
}

impl RetryConfig {
    /// Delay for a given retry attempt (1-based), jittered.
    ///
    /// The base grows as `initial * factor^attempt`, capped at
    /// `max_delay`; jitter adds up to 10% on top so simultaneous clients
    /// spread out. The result never drops below the unjittered base.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(63) as i32;
        let base = (self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp))
            .min(self.max_delay.as_secs_f64());
        let unit = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / 1_000_000_000.0; // [0, 1)
        Duration::from_secs_f64(base + base * 0.1 * unit)
    }
}

/// Health probe configuration for the pre-connect availability check.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Per-request timeout for a single probe GET.
    pub timeout: Duration,
    /// Number of leading attempts that run the probe; once the retry
    /// count reaches this, the manager dials directly. Zero disables
    /// probing entirely.
    pub precheck_attempts: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            precheck_attempts: 2,
        }
    }
}

/// Top-level tunables for the connection manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub retry: RetryConfig,
    /// Interval between app-level ping envelopes while connected.
    pub heartbeat_interval: Duration,
    /// How long a dial may sit in its connecting phase before it is
    /// abandoned and retried.
    pub connect_timeout: Duration,
    /// Settling pause between the forced disconnect and the fresh
    /// attempt inside `restart()`.
    pub restart_delay: Duration,
    pub health: HealthConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            restart_delay: Duration::from_secs(1),
            health: HealthConfig::default(),
        }
    }
}

/// Diagnostic events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A retry was scheduled.
    Reconnecting { attempt: u32, delay: Duration },
}
