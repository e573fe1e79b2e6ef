//! Reconnection engine: shared connection context, retry scheduling and
//! the close-event decision path.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatline_protocol::constants::{CLOSE_GOING_AWAY, CLOSE_NORMAL};

use crate::endpoints::{candidate_for_attempt, origin_of, Endpoints};
use crate::health;
use crate::pumps::read::CloseHook;
use crate::transport::Transport;
use crate::types::{
    snapshot, CloseEvent, ConnectionError, ConnectionEvent, ConnectionState, Handlers,
    ManagerConfig, SharedHandlers,
};

/// State shared between the manager handle, the pumps and the retry
/// tasks behind one managed connection.
pub(crate) struct ConnCtx {
    pub(crate) label: String,
    pub(crate) endpoints: Endpoints,
    pub(crate) candidates: Vec<String>,
    pub(crate) config: ManagerConfig,
    pub(crate) http: reqwest::Client,
    pub(crate) transport: Mutex<Option<Transport>>,
    pub(crate) handlers: SharedHandlers,
    pub(crate) state: RwLock<ConnectionState>,
    pub(crate) retry_count: AtomicU32,
    pub(crate) should_reconnect: AtomicBool,
    /// Attempt generation. Bumped by every cleanup; close hooks and
    /// installs from an older generation stand down.
    pub(crate) epoch: AtomicU64,
    pub(crate) retry_cancel: Mutex<Option<CancellationToken>>,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
}

impl ConnCtx {
    pub(crate) fn new(
        label: String,
        endpoints: Endpoints,
        config: ManagerConfig,
        events_tx: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        let candidates = endpoints.candidates();
        Self {
            label,
            endpoints,
            candidates,
            config,
            http: reqwest::Client::new(),
            transport: Mutex::new(None),
            handlers: Arc::new(RwLock::new(Arc::new(Handlers::default()))),
            state: RwLock::new(ConnectionState::Disconnected),
            retry_count: AtomicU32::new(0),
            should_reconnect: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            retry_cancel: Mutex::new(None),
            events_tx,
        }
    }
}

/// Updates the state and emits a `StateChanged` event, but only on an
/// actual change.
pub(crate) fn set_state(ctx: &ConnCtx, new_state: ConnectionState) {
    let changed = match ctx.state.write() {
        Ok(mut state) => {
            if *state == new_state {
                false
            } else {
                *state = new_state;
                true
            }
        }
        Err(_) => false,
    };
    if changed {
        debug!(manager = %ctx.label, state = %new_state, "state changed");
        let _ = ctx
            .events_tx
            .try_send(ConnectionEvent::StateChanged(new_state));
    }
}

/// Cancels and clears a pending retry timer, if one is armed.
pub(crate) fn cancel_any_retry(slot: &Mutex<Option<CancellationToken>>) {
    if let Ok(mut guard) = slot.lock()
        && let Some(token) = guard.take()
    {
        token.cancel();
    }
}

fn take_transport(ctx: &ConnCtx) -> Option<Transport> {
    ctx.transport.lock().ok().and_then(|mut slot| slot.take())
}

/// Tears the connection down: disables reconnection, disarms any retry,
/// invalidates in-flight attempts and closes the live transport. The
/// synthetic close event is relayed only when a transport was actually
/// open.
pub(crate) fn shutdown(ctx: &ConnCtx, code: u16, reason: &str, relay_close: bool) {
    ctx.should_reconnect.store(false, Ordering::Relaxed);
    cancel_any_retry(&ctx.retry_cancel);
    ctx.epoch.fetch_add(1, Ordering::SeqCst);
    if let Some(transport) = take_transport(ctx) {
        transport.close(code, reason);
        if relay_close {
            snapshot(&ctx.handlers).close(&CloseEvent {
                code,
                reason: reason.to_string(),
                was_clean: true,
            });
        }
    }
    set_state(ctx, ConnectionState::Disconnected);
}

/// One connection attempt against the candidate for the current retry
/// count. A failed attempt relays the error and arms the next retry
/// itself, so an `Err` here means "not connected yet", not "gave up".
pub(crate) async fn attempt_connection(
    ctx: Arc<ConnCtx>,
    is_retry: bool,
) -> Result<(), ConnectionError> {
    if !ctx.should_reconnect.load(Ordering::Relaxed) {
        debug!(manager = %ctx.label, "reconnection disabled, skipping attempt");
        return Ok(());
    }

    let epoch = ctx.epoch.fetch_add(1, Ordering::SeqCst) + 1;
    cancel_any_retry(&ctx.retry_cancel);
    if let Some(old) = take_transport(&ctx) {
        old.close(CLOSE_GOING_AWAY, "superseded");
    }

    set_state(
        &ctx,
        if is_retry {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        },
    );

    let retry_count = ctx.retry_count.load(Ordering::SeqCst);
    let url = candidate_for_attempt(&ctx.candidates, retry_count).to_string();
    info!(manager = %ctx.label, url = %url, retry_count, "connecting");

    if retry_count < ctx.config.health.precheck_attempts {
        let healthy = match origin_of(&url) {
            Some(origin) => {
                health::probe(
                    &ctx.http,
                    &origin,
                    &ctx.endpoints.health_paths,
                    ctx.config.health.timeout,
                )
                .await
            }
            None => {
                warn!(manager = %ctx.label, url = %url, "no http origin for health probe");
                false
            }
        };
        if !healthy {
            warn!(manager = %ctx.label, url = %url, "backend unavailable, scheduling retry");
            schedule_retry(&ctx);
            return Err(ConnectionError::HealthCheck { url });
        }
    }

    let hook_ctx = ctx.clone();
    let close_hook: CloseHook =
        Box::new(move |event| on_transport_closed(&hook_ctx, epoch, event));

    match tokio::time::timeout(
        ctx.config.connect_timeout,
        Transport::connect(
            &url,
            ctx.config.heartbeat_interval,
            ctx.handlers.clone(),
            close_hook,
        ),
    )
    .await
    {
        Ok(Ok((transport, dispatch_tx))) => {
            // State flips to Connected and the retry count resets under
            // the transport lock so a close hook racing this install
            // observes both afterwards.
            let installed = match ctx.transport.lock() {
                Ok(mut slot) if ctx.epoch.load(Ordering::SeqCst) == epoch => {
                    *slot = Some(transport);
                    set_state(&ctx, ConnectionState::Connected);
                    ctx.retry_count.store(0, Ordering::SeqCst);
                    true
                }
                _ => false,
            };
            if !installed {
                debug!(manager = %ctx.label, "attempt superseded before install");
                return Err(ConnectionError::Superseded);
            }
            cancel_any_retry(&ctx.retry_cancel);
            info!(manager = %ctx.label, url = %url, "connected");
            snapshot(&ctx.handlers).open();
            // Inbound dispatch starts only after the open relay.
            let _ = dispatch_tx.send(());
            Ok(())
        }
        Ok(Err(e)) => {
            let err = ConnectionError::Transport(e);
            warn!(manager = %ctx.label, url = %url, error = %err, "connection failed");
            snapshot(&ctx.handlers).error(&err);
            schedule_retry(&ctx);
            Err(err)
        }
        Err(_elapsed) => {
            warn!(
                manager = %ctx.label,
                url = %url,
                timeout_ms = ctx.config.connect_timeout.as_millis() as u64,
                "connection attempt timed out"
            );
            let err = ConnectionError::Timeout { url };
            snapshot(&ctx.handlers).error(&err);
            schedule_retry(&ctx);
            Err(err)
        }
    }
}

/// Close hook for the read pump. Relays the close event, then decides
/// between retrying and going quiet.
fn on_transport_closed(ctx: &Arc<ConnCtx>, epoch: u64, event: CloseEvent) {
    // Claim the generation. Losing the exchange means a newer attempt
    // or a shutdown already cleaned up after this transport.
    if ctx
        .epoch
        .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        debug!(manager = %ctx.label, "stale close hook, ignoring");
        return;
    }
    let _ = take_transport(ctx);
    info!(
        manager = %ctx.label,
        code = event.code,
        clean = event.was_clean,
        "connection closed"
    );
    snapshot(&ctx.handlers).close(&event);

    let retry_count = ctx.retry_count.load(Ordering::SeqCst);
    let max_attempts = ctx.config.retry.max_attempts;
    if ctx.should_reconnect.load(Ordering::Relaxed)
        && event.code != CLOSE_NORMAL
        && retry_count < max_attempts
    {
        schedule_retry(ctx);
    } else if retry_count >= max_attempts {
        warn!(manager = %ctx.label, attempts = retry_count, "retry budget exhausted");
        set_state(ctx, ConnectionState::Failed);
    } else {
        set_state(ctx, ConnectionState::Disconnected);
    }
}

/// Arms the next retry if the budget allows: bumps the retry count,
/// turns the state to `Reconnecting` and spawns the delayed attempt.
pub(crate) fn schedule_retry(ctx: &Arc<ConnCtx>) {
    if !ctx.should_reconnect.load(Ordering::Relaxed) {
        debug!(manager = %ctx.label, "reconnection disabled, not scheduling");
        return;
    }
    let current = ctx.retry_count.load(Ordering::SeqCst);
    let max_attempts = ctx.config.retry.max_attempts;
    if current >= max_attempts {
        warn!(manager = %ctx.label, attempts = current, "retry budget exhausted");
        set_state(ctx, ConnectionState::Failed);
        return;
    }

    let attempt = current + 1;
    ctx.retry_count.store(attempt, Ordering::SeqCst);
    let delay = ctx.config.retry.delay_for_attempt(attempt);

    set_state(ctx, ConnectionState::Reconnecting);
    let _ = ctx
        .events_tx
        .try_send(ConnectionEvent::Reconnecting { attempt, delay });
    info!(
        manager = %ctx.label,
        attempt,
        delay_ms = delay.as_millis() as u64,
        "retry scheduled"
    );

    let token = CancellationToken::new();
    cancel_any_retry(&ctx.retry_cancel);
    if let Ok(mut slot) = ctx.retry_cancel.lock() {
        *slot = Some(token.clone());
    }

    let ctx = ctx.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        if !ctx.should_reconnect.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = attempt_connection(ctx.clone(), true).await {
            debug!(manager = %ctx.label, error = %e, "retry attempt not yet connected");
        }
    });
}
