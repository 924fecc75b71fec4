//! WebRTC transport
//!
//! This module provides:
//! - the `TransportSession` capability the negotiation layer drives
//! - a webrtc-rs implementation with an H.264 video track
//! - the offer/answer `NegotiationCoordinator`

pub mod negotiation;

#[cfg(feature = "webrtc-streaming")]
pub mod media_track;
#[cfg(feature = "webrtc-streaming")]
pub mod peer_connection;

#[cfg(test)]
pub(crate) mod mock;

pub use negotiation::{DiscardReason, NegotiationCoordinator, NegotiationOutcome, NegotiationState, NegotiationStats};

use crate::config::WebRTCConfig;
use crate::media::FrameSink;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// WebRTC-related errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer connection creation failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// SDP processing failed
    #[error("SDP error: {0}")]
    SdpError(String),
    /// ICE candidate processing failed
    #[error("ICE error: {0}")]
    IceError(String),
    /// Media track error
    #[error("Media error: {0}")]
    MediaError(String),
    /// Transport already closed
    #[error("Transport closed")]
    Closed,
    /// Feature not enabled
    #[error("WebRTC streaming feature is not enabled")]
    FeatureDisabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpKind::Offer => f.write_str("offer"),
            SdpKind::Answer => f.write_str("answer"),
        }
    }
}

/// Session description exchanged through signaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
    Unknown,
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Closed => "closed",
            IceConnectionState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Callback for ICE connection state changes
pub type IceStateCallback = Box<dyn Fn(IceConnectionState) + Send + Sync>;

/// Video track parameters
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub stream_id: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// Real-time transport session (ICE/DTLS/SRTP live behind this)
#[async_trait]
pub trait TransportSession: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), TransportError>;

    /// Current local description, including gathered candidates
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Add an outgoing video track; frames written to the returned sink are sent to the peer
    async fn add_track(&self, spec: &TrackSpec) -> Result<Arc<dyn FrameSink>, TransportError>;

    fn on_ice_connection_state_change(&self, callback: IceStateCallback);

    async fn close(&self) -> Result<(), TransportError>;
}

/// Build the transport for this build's feature set
#[cfg(feature = "webrtc-streaming")]
pub async fn create_transport(config: &WebRTCConfig) -> Result<Arc<dyn TransportSession>, TransportError> {
    let transport = peer_connection::WebRtcTransport::new(config).await?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "webrtc-streaming"))]
pub async fn create_transport(_config: &WebRTCConfig) -> Result<Arc<dyn TransportSession>, TransportError> {
    Err(TransportError::FeatureDisabled)
}
