//! Write pump: drains the outbound channel into the WebSocket sink.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Forwards queued frames until the channel closes or the token fires,
/// then sends a best-effort close frame.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut outbound_rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            // Queued frames, a coded close frame included, drain ahead
            // of cancellation.
            biased;
            maybe_msg = outbound_rx.recv() => {
                match maybe_msg {
                    Some(msg) => {
                        if let Err(e) = sink.send(msg).await {
                            error!(error = %e, "websocket write failed");
                            break;
                        }
                    }
                    None => {
                        debug!("outbound channel closed, stopping write pump");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => {
                debug!("write pump cancelled");
                break;
            }
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}
