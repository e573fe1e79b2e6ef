//! Read pump: dispatches inbound frames to the registered handlers and
//! reports how the transport ended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use chatline_protocol::constants::{CLOSE_ABNORMAL, CLOSE_NO_STATUS};

use crate::types::{snapshot, CloseEvent, ConnectionError, SharedHandlers};

/// Invoked exactly once when the read pump exits, with the close event
/// describing how the transport ended.
pub(crate) type CloseHook = Box<dyn FnOnce(CloseEvent) + Send + 'static>;

/// Pulls frames off the socket until it closes, errors out, or the
/// token fires. Text goes to `on_message`; protocol pings are answered
/// through the write pump. Read errors are relayed to `on_error` but the
/// retry decision belongs to the close hook alone.
pub(crate) async fn read_pump<S>(
    mut stream: S,
    handlers: SharedHandlers,
    open: Arc<AtomicBool>,
    outbound_tx: mpsc::Sender<Message>,
    dispatch_gate: oneshot::Receiver<()>,
    close_hook: CloseHook,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    // Streams that die without a close frame count as abnormal, 1006.
    let mut close_event = CloseEvent {
        code: CLOSE_ABNORMAL,
        reason: String::new(),
        was_clean: false,
    };

    // Dispatch is parked until the connection is installed and the open
    // relay has run, so handlers never see a message before open. A
    // dropped gate means the attempt was abandoned first.
    let released = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("read pump cancelled");
            false
        }
        result = dispatch_gate => result.is_ok(),
    };
    if !released {
        open.store(false, Ordering::SeqCst);
        close_hook(close_event);
        return;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("read pump cancelled");
                break;
            }
            maybe_msg = stream.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "inbound text frame");
                        snapshot(&handlers).message(&text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = outbound_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        trace!("pong received");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        close_event = match frame {
                            Some(f) => CloseEvent {
                                code: u16::from(f.code),
                                reason: f.reason.to_string(),
                                was_clean: true,
                            },
                            None => CloseEvent {
                                code: CLOSE_NO_STATUS,
                                reason: String::new(),
                                was_clean: true,
                            },
                        };
                        debug!(code = close_event.code, "close frame received");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        snapshot(&handlers).error(&ConnectionError::Transport(e));
                        break;
                    }
                    None => {
                        debug!("websocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    close_hook(close_event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Handlers;
    use chatline_protocol::constants::CLOSE_NORMAL;
    use futures_util::stream;
    use std::sync::atomic::AtomicUsize;
    use std::sync::RwLock;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    fn shared(handlers: Handlers) -> SharedHandlers {
        Arc::new(RwLock::new(Arc::new(handlers)))
    }

    fn close_probe() -> (CloseHook, oneshot::Receiver<CloseEvent>) {
        let (tx, rx) = oneshot::channel();
        let hook: CloseHook = Box::new(move |event| {
            let _ = tx.send(event);
        });
        (hook, rx)
    }

    fn released_gate() -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();
        rx
    }

    #[tokio::test]
    async fn dispatches_text_and_reports_abnormal_end() {
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let r = received.clone();
        let handlers = shared(Handlers::new().on_message(move |t| {
            r.lock().unwrap().push(t.to_string());
        }));
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let (hook, hook_rx) = close_probe();

        let frames = stream::iter(vec![
            Ok::<_, tungstenite::Error>(Message::Text("hello".to_string().into())),
            Ok(Message::Text("world".to_string().into())),
        ]);
        read_pump(
            frames,
            handlers,
            open.clone(),
            outbound_tx,
            released_gate(),
            hook,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(*received.lock().unwrap(), vec!["hello", "world"]);
        assert!(!open.load(Ordering::SeqCst));
        let event = hook_rx.await.unwrap();
        assert_eq!(event.code, CLOSE_ABNORMAL);
        assert!(!event.was_clean);
    }

    #[tokio::test]
    async fn close_frame_yields_clean_event() {
        let handlers = shared(Handlers::new());
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let (hook, hook_rx) = close_probe();

        let frames = stream::iter(vec![Ok::<_, tungstenite::Error>(Message::Close(Some(
            CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".to_string().into(),
            },
        )))]);
        read_pump(
            frames,
            handlers,
            open,
            outbound_tx,
            released_gate(),
            hook,
            CancellationToken::new(),
        )
        .await;

        let event = hook_rx.await.unwrap();
        assert_eq!(event.code, CLOSE_NORMAL);
        assert_eq!(event.reason, "bye");
        assert!(event.was_clean);
    }

    #[tokio::test]
    async fn bare_close_frame_maps_to_no_status() {
        let handlers = shared(Handlers::new());
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let (hook, hook_rx) = close_probe();

        let frames =
            stream::iter(vec![Ok::<_, tungstenite::Error>(Message::Close(None))]);
        read_pump(
            frames,
            handlers,
            open,
            outbound_tx,
            released_gate(),
            hook,
            CancellationToken::new(),
        )
        .await;

        let event = hook_rx.await.unwrap();
        assert_eq!(event.code, CLOSE_NO_STATUS);
        assert!(event.was_clean);
    }

    #[tokio::test]
    async fn read_error_relays_to_handler_then_closes() {
        let errors = Arc::new(AtomicUsize::new(0));
        let e = errors.clone();
        let handlers = shared(Handlers::new().on_error(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        }));
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let (hook, hook_rx) = close_probe();

        let frames = stream::iter(vec![
            Ok(Message::Text("still fine".to_string().into())),
            Err(tungstenite::Error::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            ))),
        ]);
        read_pump(
            frames,
            handlers,
            open,
            outbound_tx,
            released_gate(),
            hook,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        let event = hook_rx.await.unwrap();
        assert_eq!(event.code, CLOSE_ABNORMAL);
        assert!(!event.was_clean);
    }

    #[tokio::test]
    async fn protocol_ping_is_answered_with_pong() {
        let handlers = shared(Handlers::new());
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
        let (hook, _hook_rx) = close_probe();

        let frames = stream::iter(vec![Ok::<_, tungstenite::Error>(Message::Ping(
            vec![1, 2, 3].into(),
        ))]);
        read_pump(
            frames,
            handlers,
            open,
            outbound_tx,
            released_gate(),
            hook,
            CancellationToken::new(),
        )
        .await;

        let reply = outbound_rx.recv().await.unwrap();
        assert_eq!(reply, Message::Pong(vec![1, 2, 3].into()));
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_pump() {
        let handlers = shared(Handlers::new());
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let (hook, hook_rx) = close_probe();
        let cancel = CancellationToken::new();

        let frames = stream::pending::<Result<Message, tungstenite::Error>>();
        let handle = tokio::spawn(read_pump(
            frames,
            handlers,
            open.clone(),
            outbound_tx,
            released_gate(),
            hook,
            cancel.clone(),
        ));

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(!open.load(Ordering::SeqCst));
        let event = hook_rx.await.unwrap();
        assert_eq!(event.code, CLOSE_ABNORMAL);
    }

    #[tokio::test]
    async fn dispatch_holds_until_the_gate_opens() {
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let r = received.clone();
        let handlers = shared(Handlers::new().on_message(move |t| {
            r.lock().unwrap().push(t.to_string());
        }));
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let (hook, hook_rx) = close_probe();
        let (gate_tx, gate_rx) = oneshot::channel();

        let frames = stream::iter(vec![Ok::<_, tungstenite::Error>(Message::Text(
            "early".to_string().into(),
        ))]);
        let handle = tokio::spawn(read_pump(
            frames,
            handlers,
            open,
            outbound_tx,
            gate_rx,
            hook,
            CancellationToken::new(),
        ));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(received.lock().unwrap().is_empty());

        gate_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(*received.lock().unwrap(), vec!["early"]);
        hook_rx.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_gate_unwinds_without_dispatching() {
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let r = received.clone();
        let handlers = shared(Handlers::new().on_message(move |t| {
            r.lock().unwrap().push(t.to_string());
        }));
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let (hook, hook_rx) = close_probe();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        drop(gate_tx);

        let frames = stream::iter(vec![Ok::<_, tungstenite::Error>(Message::Text(
            "never seen".to_string().into(),
        ))]);
        read_pump(
            frames,
            handlers,
            open.clone(),
            outbound_tx,
            gate_rx,
            hook,
            CancellationToken::new(),
        )
        .await;

        assert!(received.lock().unwrap().is_empty());
        assert!(!open.load(Ordering::SeqCst));
        let event = hook_rx.await.unwrap();
        assert_eq!(event.code, CLOSE_ABNORMAL);
        assert!(!event.was_clean);
    }
}
