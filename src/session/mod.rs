//! Session orchestration
//!
//! Wires probe, signaling, negotiation and media together and owns the
//! process lifecycle.

pub mod chat;
pub mod controller;

pub use chat::ChatCommand;
pub use controller::{SessionController, SessionEvent, SessionSummary};

use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::webrtc::TransportError;
use clap::ValueEnum;
use std::fmt;
use thiserror::Error;

/// Startup failures that reach the operator
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Capture device unavailable: {0}")]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Which side starts the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Role {
    /// Sends the offer once a peer joins
    Host,
    /// Waits for an offer
    #[default]
    Joiner,
}

impl Role {
    pub fn is_initiator(&self) -> bool {
        matches!(self, Role::Host)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Joiner => f.write_str("joiner"),
        }
    }
}
