//! Signaling channel
//!
//! Holds the single relay connection. A writer task drains an outbound queue
//! into the socket; a reader task decodes frames and hands each envelope of
//! the active room to the handler subscribed for its kind, in arrival order.

use super::envelope::{Decoded, MessageKind, SignalMessage, SignalingEnvelope};
use super::room::RoomSession;
use super::SignalingError;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use uuid::Uuid;

/// Handler for one message kind
pub type SignalHandler = Arc<dyn Fn(SignalMessage) + Send + Sync>;

/// Called when the relay connection drops without `close()`
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Outbound half of the channel, as seen by the negotiation layer
pub trait SignalSender: Send + Sync {
    /// Queue a message for the active room. Silently dropped when disconnected.
    fn send(&self, message: SignalMessage);

    fn is_connected(&self) -> bool;
}

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
enum Dispatch {
    Delivered(MessageKind),
    Unhandled(MessageKind),
    UnknownKind,
    ForeignRoom,
    Malformed,
}

struct Dispatcher {
    room_id: String,
    handlers: RwLock<HashMap<MessageKind, SignalHandler>>,
}

impl Dispatcher {
    fn dispatch(&self, text: &str) -> Dispatch {
        let (room_id, message) = match SignalingEnvelope::decode(text) {
            Ok(Decoded::Envelope { room_id, message }) => (room_id, message),
            Ok(Decoded::UnknownKind(kind)) => {
                debug!("Ignoring unknown signaling message type '{}'", kind);
                return Dispatch::UnknownKind;
            }
            Err(e) => {
                warn!("{}", e);
                return Dispatch::Malformed;
            }
        };

        let kind = message.kind();
        if room_id.as_deref() != Some(self.room_id.as_str()) {
            debug!(
                "Dropping {} for room {:?} (active room '{}')",
                kind, room_id, self.room_id
            );
            return Dispatch::ForeignRoom;
        }

        // Clone out so the handler runs without holding the registry lock
        let handler = self.handlers.read().get(&kind).cloned();
        match handler {
            Some(handler) => {
                debug!("Signaling <- {}", kind);
                handler(message);
                Dispatch::Delivered(kind)
            }
            None => {
                debug!("No handler for {}", kind);
                Dispatch::Unhandled(kind)
            }
        }
    }
}

/// Persistent connection to a room-based relay
pub struct SignalingChannel {
    local_peer_id: String,
    connect_timeout: Duration,
    dispatcher: Arc<Dispatcher>,
    connected: Arc<AtomicBool>,
    closed: AtomicBool,
    disconnect_handler: Arc<RwLock<Option<DisconnectHandler>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl SignalingChannel {
    /// Channel for `room_id` with a fresh local peer id
    pub fn new(room_id: impl Into<String>, connect_timeout: Duration) -> Self {
        Self::with_peer_id(room_id, Uuid::new_v4().to_string(), connect_timeout)
    }

    pub fn with_peer_id(room_id: impl Into<String>, local_peer_id: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            local_peer_id: local_peer_id.into(),
            connect_timeout,
            dispatcher: Arc::new(Dispatcher {
                room_id: room_id.into(),
                handlers: RwLock::new(HashMap::new()),
            }),
            connected: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            disconnect_handler: Arc::new(RwLock::new(None)),
            outbound: Mutex::new(None),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.dispatcher.room_id
    }

    /// Messages handed to the writer task
    pub fn messages_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Messages dropped because the channel was down
    pub fn messages_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Register the handler for `kind`, replacing any previous one
    pub fn subscribe<F>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(SignalMessage) + Send + Sync + 'static,
    {
        let previous = self.dispatcher.handlers.write().insert(kind, Arc::new(handler));
        if previous.is_some() {
            warn!("Replaced existing handler for {}", kind);
        }
    }

    pub fn unsubscribe(&self, kind: MessageKind) -> bool {
        self.dispatcher.handlers.write().remove(&kind).is_some()
    }

    /// Register the handler run when the relay drops the connection
    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.disconnect_handler.write() = Some(Arc::new(handler));
    }

    /// Connect to the relay and join the configured room.
    ///
    /// No retry; the caller decides what a failure means.
    pub async fn connect(&self, url: &str) -> Result<RoomSession, SignalingError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SignalingError::Closed);
        }
        if self.is_connected() {
            return Err(SignalingError::AlreadyConnected);
        }

        let (ws_stream, _) = match tokio::time::timeout(self.connect_timeout, connect_async(url)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(SignalingError::ConnectionFailed(format!("{}: {}", url, e))),
            Err(_) => return Err(SignalingError::Timeout(self.connect_timeout)),
        };
        info!("Connected to signaling relay {}", url);

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if ws_write.send(message).await.is_err() || closing {
                    break;
                }
            }
        });

        // Mark the channel up before the reader exists, so a relay that hangs
        // up immediately leaves it down
        *self.outbound.lock() = Some(tx);
        *self.writer.lock() = Some(writer);
        self.connected.store(true, Ordering::SeqCst);

        let dispatcher = Arc::clone(&self.dispatcher);
        let connected = Arc::clone(&self.connected);
        let disconnect_handler = Arc::clone(&self.disconnect_handler);
        let reader = tokio::spawn(async move {
            while let Some(result) = ws_read.next().await {
                match result {
                    Ok(Message::Text(text)) => {
                        dispatcher.dispatch(&text);
                    }
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => {
                            dispatcher.dispatch(&text);
                        }
                        Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        match &e {
                            WsError::ConnectionClosed
                            | WsError::AlreadyClosed
                            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                                debug!("Signaling socket closed: {}", e)
                            }
                            _ => warn!("Signaling socket error: {}", e),
                        }
                        break;
                    }
                }
            }
            if connected.swap(false, Ordering::SeqCst) {
                warn!("Signaling relay disconnected; outbound messages will be dropped");
                let handler = disconnect_handler.read().clone();
                if let Some(handler) = handler {
                    handler();
                }
            }
        });
        *self.reader.lock() = Some(reader);

        self.send(SignalMessage::Join {
            peer_id: Some(self.local_peer_id.clone()),
        });
        info!("Joined room '{}' as {}", self.room_id(), self.local_peer_id);

        Ok(RoomSession::new(self.room_id(), Some(self.local_peer_id.clone())))
    }

    /// Graceful disconnect. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);

        if let Some(tx) = self.outbound.lock().take() {
            let _ = tx.send(Message::Close(None));
        }

        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
                debug!("Signaling writer did not drain in time");
            }
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        info!(
            "Signaling channel closed ({} sent, {} dropped)",
            self.messages_sent(),
            self.messages_dropped()
        );
    }

    fn drop_outbound(&self, kind: MessageKind) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        debug!("Signaling offline, dropping {}", kind);
    }
}

impl SignalSender for SignalingChannel {
    fn send(&self, message: SignalMessage) {
        let kind = message.kind();
        if !self.is_connected() {
            self.drop_outbound(kind);
            return;
        }

        let text = match SignalingEnvelope::new(self.room_id(), message).encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        let queued = match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(Message::Text(text)).is_ok(),
            None => false,
        };
        if queued {
            self.sent.fetch_add(1, Ordering::Relaxed);
            debug!("Signaling -> {}", kind);
        } else {
            self.connected.store(false, Ordering::SeqCst);
            self.drop_outbound(kind);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.get_mut().take() {
            writer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> SignalingChannel {
        SignalingChannel::with_peer_id("test-room", "local", Duration::from_secs(1))
    }

    fn recorder(channel: &SignalingChannel, kind: MessageKind) -> Arc<Mutex<Vec<SignalMessage>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel.subscribe(kind, move |message| sink.lock().push(message));
        seen
    }

    #[test]
    fn foreign_and_roomless_envelopes_never_reach_handlers() {
        let channel = channel();
        let offers = recorder(&channel, MessageKind::Offer);

        let foreign = r#"{"type":"offer","roomId":"other-room","sdp":"v=0"}"#;
        let roomless = r#"{"type":"offer","sdp":"v=0"}"#;
        assert_eq!(channel.dispatcher.dispatch(foreign), Dispatch::ForeignRoom);
        assert_eq!(channel.dispatcher.dispatch(roomless), Dispatch::ForeignRoom);
        assert!(offers.lock().is_empty());

        let local = r#"{"type":"offer","roomId":"test-room","sdp":"v=0"}"#;
        assert_eq!(channel.dispatcher.dispatch(local), Dispatch::Delivered(MessageKind::Offer));
        assert_eq!(offers.lock().len(), 1);
    }

    #[test]
    fn delivers_in_arrival_order() {
        let channel = channel();
        let chat = recorder(&channel, MessageKind::ChatMessage);
        for i in 0..5 {
            let text = format!(r#"{{"type":"chat-message","roomId":"test-room","sender":"b","message":"{}"}}"#, i);
            channel.dispatcher.dispatch(&text);
        }
        let order: Vec<String> = chat
            .lock()
            .iter()
            .map(|m| match m {
                SignalMessage::ChatMessage { message, .. } => message.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(order, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn unknown_unhandled_and_malformed_frames_are_tolerated() {
        let channel = channel();
        assert_eq!(
            channel.dispatcher.dispatch(r#"{"type":"renegotiate","roomId":"test-room"}"#),
            Dispatch::UnknownKind
        );
        assert_eq!(
            channel.dispatcher.dispatch(r#"{"type":"answer","roomId":"test-room","sdp":"v=0"}"#),
            Dispatch::Unhandled(MessageKind::Answer)
        );
        assert_eq!(channel.dispatcher.dispatch("{"), Dispatch::Malformed);
    }

    #[test]
    fn one_handler_per_kind() {
        let channel = channel();
        let first = recorder(&channel, MessageKind::PeerJoined);
        let second = recorder(&channel, MessageKind::PeerJoined);
        channel
            .dispatcher
            .dispatch(r#"{"type":"user-connected","roomId":"test-room","userId":"peer"}"#);
        assert!(first.lock().is_empty());
        assert_eq!(second.lock().len(), 1);

        assert!(channel.unsubscribe(MessageKind::PeerJoined));
        assert!(!channel.unsubscribe(MessageKind::PeerJoined));
    }

    #[test]
    fn send_while_disconnected_is_silent() {
        let channel = channel();
        channel.send(SignalMessage::Offer { sdp: "v=0".to_string() });
        channel.send(SignalMessage::ChatMessage {
            sender: "a".to_string(),
            message: "hi".to_string(),
        });
        assert!(!channel.is_connected());
        assert_eq!(channel.messages_sent(), 0);
        assert_eq!(channel.messages_dropped(), 2);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let channel = channel();
        channel.close().await;
        channel.close().await;
        assert!(matches!(
            channel.connect("ws://127.0.0.1:9/").await,
            Err(SignalingError::Closed)
        ));
    }

    #[tokio::test]
    async fn relay_hangup_marks_channel_down_and_notifies() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let join = ws.next().await.unwrap().unwrap();
            ws.close(None).await.unwrap();
            join
        });

        let channel = channel();
        let (lost_tx, mut lost_rx) = mpsc::unbounded_channel();
        channel.on_disconnect(move || {
            let _ = lost_tx.send(());
        });
        channel.connect(&format!("ws://{}/", addr)).await.unwrap();

        let join = relay.await.unwrap();
        assert!(join.to_text().unwrap().contains("join-room"));
        tokio::time::timeout(Duration::from_secs(5), lost_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!channel.is_connected());

        channel.send(SignalMessage::Offer { sdp: "v=0".to_string() });
        assert_eq!(channel.messages_dropped(), 1);

        // a deliberate close is not a loss
        channel.close().await;
        assert!(lost_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let channel = channel();
        let result = channel.connect(&format!("ws://127.0.0.1:{}/", port)).await;
        assert!(matches!(
            result,
            Err(SignalingError::ConnectionFailed(_)) | Err(SignalingError::Timeout(_))
        ));
        assert!(!channel.is_connected());
    }
}
