//! LumenRTC - room-based peer-to-peer WebRTC video sessions
//!
//! Two peers meet in a named room on a relay, negotiate a WebRTC session and
//! stream a video feed whose processing adapts to the local hardware tier.

pub mod args;
pub mod capture;
pub mod config;
pub mod hardware;
pub mod media;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod webrtc;

// Re-exports
pub use config::Config;
pub use hardware::{HardwareProfile, HardwareTier};
pub use media::{MediaPipeline, PipelineConfig};
pub use session::{Role, SessionController, SessionError};
pub use signaling::{SignalMessage, SignalingChannel};
pub use crate::webrtc::{NegotiationCoordinator, TransportSession};
