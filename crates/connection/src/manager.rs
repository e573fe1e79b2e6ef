//! Public connection manager handle.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use chatline_protocol::constants::{CLOSE_GOING_AWAY, CLOSE_NORMAL};

use crate::endpoints::Endpoints;
use crate::reconnection::{attempt_connection, shutdown, ConnCtx};
use crate::types::{
    ConnectionError, ConnectionEvent, ConnectionState, Handlers, ManagerConfig,
};

/// Managed WebSocket connection with health pre-checks, candidate URL
/// rotation and bounded backoff reconnection.
///
/// The manager is cheap to share behind an `Arc` and all methods take
/// `&self`. Once [`connect`](Self::connect) has run, the connection
/// looks after itself: lost transports are retried with exponential
/// backoff until the retry budget runs out, and app-level heartbeats
/// flow while a socket is open. [`disconnect`](Self::disconnect) stops
/// all of that for good; [`restart`](Self::restart) starts over with a
/// fresh retry budget.
pub struct ConnectionManager {
    pub(crate) ctx: Arc<ConnCtx>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

impl ConnectionManager {
    pub fn new(label: impl Into<String>, endpoints: Endpoints) -> Self {
        Self::with_config(label, endpoints, ManagerConfig::default())
    }

    pub fn with_config(
        label: impl Into<String>,
        endpoints: Endpoints,
        config: ManagerConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            ctx: Arc::new(ConnCtx::new(label.into(), endpoints, config, events_tx)),
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Installs the handlers, enables reconnection and runs the first
    /// attempt. An `Err` means this attempt did not produce an open
    /// socket; retries continue in the background regardless, so
    /// callers that only care about eventual connectivity can ignore
    /// it.
    pub async fn connect(&self, handlers: Handlers) -> Result<(), ConnectionError> {
        if let Ok(mut current) = self.ctx.handlers.write() {
            *current = Arc::new(handlers);
        }
        self.ctx.should_reconnect.store(true, Ordering::Relaxed);
        attempt_connection(self.ctx.clone(), false).await
    }

    /// Serializes the payload to JSON and queues it as a text frame.
    /// Returns false when not connected or the payload does not
    /// serialize; sending never fails loudly.
    pub fn send_json<T: Serialize>(&self, payload: &T) -> bool {
        match serde_json::to_string(payload) {
            Ok(json) => self.send_text(&json),
            Err(e) => {
                warn!(manager = %self.ctx.label, error = %e, "payload did not serialize");
                false
            }
        }
    }

    /// Queues a raw text frame. Returns false when not connected.
    pub fn send_text(&self, text: &str) -> bool {
        self.ctx
            .transport
            .lock()
            .is_ok_and(|slot| slot.as_ref().is_some_and(|t| t.send_text(text)))
    }

    /// Permanently closes the connection with a normal close code. No
    /// retries run afterwards; only [`restart`](Self::restart) or a new
    /// [`connect`](Self::connect) resumes.
    pub fn disconnect(&self) {
        self.disconnect_with(CLOSE_NORMAL, "client disconnect");
    }

    /// [`disconnect`](Self::disconnect) with an explicit close code and
    /// reason.
    pub fn disconnect_with(&self, code: u16, reason: &str) {
        info!(manager = %self.ctx.label, code, "disconnect requested");
        shutdown(&self.ctx, code, reason, true);
    }

    /// Tears the connection down and dials again after a short settling
    /// delay, with a fresh retry budget. Fire and forget; usable from
    /// any state, `Failed` included.
    pub fn restart(&self) {
        info!(manager = %self.ctx.label, "restart requested");
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            shutdown(&ctx, CLOSE_NORMAL, "restart", true);
            tokio::time::sleep(ctx.config.restart_delay).await;
            ctx.retry_count.store(0, Ordering::SeqCst);
            ctx.should_reconnect.store(true, Ordering::Relaxed);
            if let Err(e) = attempt_connection(ctx.clone(), false).await {
                warn!(manager = %ctx.label, error = %e, "restart attempt not yet connected");
            }
        });
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.ctx
            .state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// True while an open socket is installed.
    pub fn is_connected(&self) -> bool {
        self.ctx
            .transport
            .lock()
            .is_ok_and(|slot| slot.as_ref().is_some_and(|t| t.is_open()))
    }

    /// Hands out the diagnostic event receiver. Yields `Some` exactly
    /// once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().ok().and_then(|mut rx| rx.take())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        shutdown(&self.ctx, CLOSE_GOING_AWAY, "manager dropped", false);
    }
}
