//! Development room relay
//!
//! A minimal WebSocket pub/sub relay for local testing. A `join-room`
//! envelope adds the connection to a room and announces it to the other
//! members with `user-connected`; every other text frame is forwarded
//! verbatim to the other members of its `roomId`. Closing the socket
//! announces `user-disconnected` in each joined room.

use crate::signaling::MessageKind;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Default bind address for `lumen-relay`
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),
}

type ConnectionId = u64;

struct Member {
    peer_id: String,
    outbound: mpsc::UnboundedSender<Message>,
    rooms: HashSet<String>,
}

/// Room membership shared by all connections
#[derive(Default)]
struct Rooms {
    members: HashMap<ConnectionId, Member>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl Rooms {
    fn register(&mut self, id: ConnectionId, outbound: mpsc::UnboundedSender<Message>) {
        self.members.insert(
            id,
            Member {
                peer_id: format!("conn-{}", id),
                outbound,
                rooms: HashSet::new(),
            },
        );
    }

    fn join(&mut self, id: ConnectionId, room_id: &str, peer_id: Option<&str>) {
        let Some(member) = self.members.get_mut(&id) else {
            return;
        };
        if let Some(peer_id) = peer_id {
            member.peer_id = peer_id.to_string();
        }
        member.rooms.insert(room_id.to_string());
        let peer_id = member.peer_id.clone();
        self.rooms.entry(room_id.to_string()).or_default().insert(id);

        info!("{} joined room {}", peer_id, room_id);
        let announce = json!({
            "type": MessageKind::PeerJoined.wire_name(),
            "roomId": room_id,
            "userId": peer_id,
        });
        self.broadcast(room_id, id, &announce.to_string());
    }

    fn leave_all(&mut self, id: ConnectionId) {
        let Some(member) = self.members.remove(&id) else {
            return;
        };
        for room_id in &member.rooms {
            if let Some(room) = self.rooms.get_mut(room_id) {
                room.remove(&id);
                if room.is_empty() {
                    self.rooms.remove(room_id);
                }
            }
            let announce = json!({
                "type": MessageKind::PeerLeft.wire_name(),
                "roomId": room_id,
                "userId": member.peer_id,
            });
            self.broadcast(room_id, id, &announce.to_string());
        }
        debug!("{} disconnected", member.peer_id);
    }

    /// Send to every member of `room_id` except `from`
    fn broadcast(&self, room_id: &str, from: ConnectionId, text: &str) -> usize {
        let Some(room) = self.rooms.get(room_id) else {
            return 0;
        };
        room.iter()
            .filter(|&&member| member != from)
            .filter_map(|member| self.members.get(member))
            .filter(|member| member.outbound.send(Message::Text(text.to_string())).is_ok())
            .count()
    }

    fn room_size(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(HashSet::len).unwrap_or(0)
    }
}

/// Development relay server
pub struct RelayServer {
    listener: TcpListener,
    rooms: Arc<Mutex<Rooms>>,
    next_id: AtomicU64,
}

impl RelayServer {
    pub async fn bind(addr: &str) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            rooms: Arc::new(Mutex::new(Rooms::default())),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> Result<(), RelayError> {
        info!("Relay listening on ws://{}", self.local_addr()?);
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let rooms = self.rooms.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, id, rooms).await {
                    error!("Relay connection {} error: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: ConnectionId,
    rooms: Arc<Mutex<Rooms>>,
) -> Result<(), RelayError> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| RelayError::Handshake(e.to_string()))?;
    debug!("Relay connection from {}", addr);

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if write.send(msg).await.is_err() {
                break;
            }
        }
    });

    rooms.lock().register(id, outbound_tx.clone());

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => route(&rooms, id, &text),
            Ok(Message::Ping(ping)) => {
                let _ = outbound_tx.send(Message::Pong(ping));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Relay read error from {}: {}", addr, e);
                break;
            }
        }
    }

    rooms.lock().leave_all(id);
    drop(outbound_tx);
    writer.abort();
    Ok(())
}

fn route(rooms: &Mutex<Rooms>, id: ConnectionId, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Relay dropped malformed frame: {}", e);
            return;
        }
    };
    let Some(room_id) = value.get("roomId").and_then(Value::as_str) else {
        debug!("Relay dropped frame without roomId");
        return;
    };
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();

    let mut rooms = rooms.lock();
    if kind == MessageKind::Join.wire_name() {
        let peer_id = value.get("peerId").and_then(Value::as_str);
        rooms.join(id, room_id, peer_id);
        debug!("Room {} now has {} members", room_id, rooms.room_size(room_id));
    } else {
        let delivered = rooms.broadcast(room_id, id, text);
        debug!("Relayed {} to {} peers in {}", kind, delivered, room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(rooms: &mut Rooms, id: ConnectionId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        rooms.register(id, tx);
        rx
    }

    fn text(rx: &mut mpsc::UnboundedReceiver<Message>) -> Option<Value> {
        match rx.try_recv().ok()? {
            Message::Text(text) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }

    #[test]
    fn join_is_announced_to_others_only() {
        let mut rooms = Rooms::default();
        let mut a = member(&mut rooms, 1);
        let mut b = member(&mut rooms, 2);

        rooms.join(1, "r", Some("alice"));
        assert!(text(&mut a).is_none());

        rooms.join(2, "r", Some("bob"));
        let announce = text(&mut a).unwrap();
        assert_eq!(announce["type"], "user-connected");
        assert_eq!(announce["userId"], "bob");
        assert_eq!(announce["roomId"], "r");
        assert!(text(&mut b).is_none());
    }

    #[test]
    fn messages_stay_in_their_room() {
        let rooms = Mutex::new(Rooms::default());
        let (mut a, mut b, mut c) = {
            let mut guard = rooms.lock();
            let a = member(&mut guard, 1);
            let b = member(&mut guard, 2);
            let c = member(&mut guard, 3);
            guard.join(1, "r", None);
            guard.join(2, "r", None);
            guard.join(3, "other", None);
            (a, b, c)
        };
        while text(&mut a).is_some() {}

        route(&rooms, 1, r#"{"type":"offer","roomId":"r","sdp":"v=0"}"#);
        assert_eq!(text(&mut b).unwrap()["sdp"], "v=0");
        assert!(text(&mut a).is_none());
        assert!(text(&mut c).is_none());

        route(&rooms, 1, "not json");
        route(&rooms, 1, r#"{"type":"offer","sdp":"v=0"}"#);
        assert!(text(&mut b).is_none());
    }

    #[test]
    fn leaving_announces_and_cleans_up() {
        let mut rooms = Rooms::default();
        let mut a = member(&mut rooms, 1);
        let _b = member(&mut rooms, 2);
        rooms.join(1, "r", Some("alice"));
        rooms.join(2, "r", Some("bob"));
        while text(&mut a).is_some() {}

        rooms.leave_all(2);
        let announce = text(&mut a).unwrap();
        assert_eq!(announce["type"], "user-disconnected");
        assert_eq!(announce["userId"], "bob");
        assert_eq!(rooms.room_size("r"), 1);

        rooms.leave_all(1);
        assert_eq!(rooms.room_size("r"), 0);
    }
}
