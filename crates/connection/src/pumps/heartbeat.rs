//! Heartbeat pump: periodic app-level ping envelopes.
//!
//! The backend treats a quiet client as gone, so every live transport
//! keeps a `ping` envelope flowing on a fixed interval. The pump rides
//! the transport's cancellation token and also stops on its own once
//! the open flag drops, so it never outlives the connection it belongs
//! to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use chatline_protocol::Envelope;

pub(crate) async fn heartbeat_pump(
    outbound_tx: mpsc::Sender<Message>,
    open: Arc<AtomicBool>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip the immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("heartbeat pump cancelled");
                break;
            }
            _ = interval.tick() => {
                if !open.load(Ordering::SeqCst) {
                    debug!("transport no longer open, stopping heartbeat");
                    break;
                }
                let json = match serde_json::to_string(&Envelope::ping()) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "could not serialize ping envelope");
                        continue;
                    }
                };
                if outbound_tx.send(Message::Text(json.into())).await.is_err() {
                    debug!("outbound channel closed, stopping heartbeat");
                    break;
                }
            }
        }
    }
}
