//! A live WebSocket connection and the pump tasks that service it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use chatline_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::pumps::heartbeat::heartbeat_pump;
use crate::pumps::read::{read_pump, CloseHook};
use crate::pumps::write::write_pump;
use crate::types::SharedHandlers;

/// One dialed socket. Owns the read, write and heartbeat pumps; they
/// all stop when the transport closes or is dropped.
pub(crate) struct Transport {
    outbound_tx: mpsc::Sender<Message>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
    heartbeat_handle: JoinHandle<()>,
}

impl Transport {
    /// Dials `url`, performs the WebSocket handshake and spawns the
    /// pumps. Inbound dispatch stays parked until the returned sender
    /// fires, so the caller relays its open callback before the first
    /// message lands; the close hook fires exactly once when the read
    /// pump ends.
    pub(crate) async fn connect(
        url: &str,
        heartbeat_interval: Duration,
        handlers: SharedHandlers,
        close_hook: CloseHook,
    ) -> Result<(Self, oneshot::Sender<()>), tungstenite::Error> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

        let (ws_stream, _response) =
            connect_async_with_config(url, Some(ws_config), false).await?;
        let (sink, stream) = ws_stream.split();

        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (dispatch_tx, dispatch_rx) = oneshot::channel();
        let open = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(write_pump(sink, outbound_rx, cancel.clone()));
        let read_handle = tokio::spawn(read_pump(
            stream,
            handlers,
            open.clone(),
            outbound_tx.clone(),
            dispatch_rx,
            close_hook,
            cancel.clone(),
        ));
        let heartbeat_handle = tokio::spawn(heartbeat_pump(
            outbound_tx.clone(),
            open.clone(),
            heartbeat_interval,
            cancel.clone(),
        ));

        Ok((
            Self {
                outbound_tx,
                open,
                cancel,
                read_handle,
                write_handle,
                heartbeat_handle,
            },
            dispatch_tx,
        ))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Queues a text frame. Returns false when the transport is closed
    /// or the outbound queue is full.
    pub(crate) fn send_text(&self, text: &str) -> bool {
        if !self.is_open() {
            return false;
        }
        match self
            .outbound_tx
            .try_send(Message::Text(text.to_string().into()))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "could not queue outbound frame");
                false
            }
        }
    }

    /// Orderly shutdown: marks the transport closed, queues a coded
    /// close frame and cancels the pumps.
    pub(crate) fn close(&self, code: u16, reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        let _ = self.outbound_tx.try_send(Message::Close(Some(frame)));
        self.cancel.cancel();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.read_handle.abort();
        self.write_handle.abort();
        self.heartbeat_handle.abort();
    }
}
