//! Room-based signaling
//!
//! One WebSocket connection to the relay, typed envelopes on the wire and a
//! subscription registry with exactly one handler per message kind.

pub mod channel;
pub mod envelope;
pub mod room;

pub use channel::{DisconnectHandler, SignalHandler, SignalSender, SignalingChannel};
pub use envelope::{Decoded, IceCandidateInfo, MessageKind, SignalMessage, SignalingEnvelope};
pub use room::RoomSession;

use std::time::Duration;
use thiserror::Error;

/// Signaling errors
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Relay unreachable or handshake rejected
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Handshake did not finish in time
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// Envelope could not be parsed or built
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// connect() on a live channel
    #[error("Already connected")]
    AlreadyConnected,

    /// Channel was closed
    #[error("Signaling channel closed")]
    Closed,
}
