//! Resilient WebSocket connection management for chatline clients.
//!
//! [`ConnectionManager`] wraps one logical connection to a chatline
//! backend: it rotates through candidate endpoint URLs, runs an HTTP
//! health probe before early dial attempts, reconnects with bounded
//! exponential backoff when the transport drops, and keeps app-level
//! heartbeats flowing while a socket is open. Traffic and lifecycle
//! changes are relayed through caller-supplied [`Handlers`].
//!
//! ```no_run
//! use chatline_connection::{ConnectionManager, Endpoints, Handlers};
//!
//! # async fn run() -> Result<(), chatline_connection::ConnectionError> {
//! let endpoints = Endpoints::new(
//!     "wss://chat.example.com/api/chat",
//!     "wss://backup.example.com/api/chat",
//! );
//! let manager = ConnectionManager::new("chat", endpoints);
//! manager
//!     .connect(Handlers::new().on_message(|text| println!("<- {text}")))
//!     .await?;
//! manager.send_text("hello");
//! # Ok(())
//! # }
//! ```

pub mod endpoints;
pub(crate) mod health;
pub mod manager;
pub(crate) mod pumps;
pub(crate) mod reconnection;
pub(crate) mod transport;
pub mod types;

pub use endpoints::Endpoints;
pub use manager::ConnectionManager;
pub use types::{
    CloseEvent, ConnectionError, ConnectionEvent, ConnectionState, Handlers, HealthConfig,
    ManagerConfig, RetryConfig,
};
