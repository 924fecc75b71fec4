//! Video capture
//!
//! Frame buffer, presentation clock and the capture-source abstraction the
//! media pipeline pulls from.

#[cfg(feature = "camera")]
pub mod camera;
pub mod capturer;
pub mod frame;

#[cfg(feature = "camera")]
pub use camera::CameraSource;
pub use capturer::{open_source, CaptureSource, TestPatternSource, UnavailableSource};
pub use frame::{FrameClock, FrameStats, TimeBase, VideoFrame};

use thiserror::Error;

/// Capture-related errors
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device could not be opened at all
    #[error("Capture device unavailable: {0}")]
    Unavailable(String),
    /// A single read failed
    #[error("Capture read failed: {0}")]
    ReadFailed(String),
    /// Read did not complete in time
    #[error("Capture read timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// Device already released
    #[error("Capture device released")]
    Released,
}
