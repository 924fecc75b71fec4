//! Media processing
//!
//! Capture → tier filter → overlay → preview → transport sink.

pub mod filter;
pub mod overlay;
pub mod pipeline;
pub mod preview;

pub use filter::{filter_for_tier, FrameFilter};
pub use pipeline::{MediaPipeline, PipelineConfig};
pub use preview::{PreviewSurface, SnapshotPreview};

use crate::capture::VideoFrame;
use async_trait::async_trait;
use thiserror::Error;

/// Media-related errors
#[derive(Debug, Error)]
pub enum MediaError {
    /// Preview surface failed
    #[error("Preview error: {0}")]
    Preview(String),
    /// Encoding for the transport failed
    #[error("Encode error: {0}")]
    Encode(String),
    /// Sink rejected the frame
    #[error("Sink error: {0}")]
    Sink(String),
}

/// Consumer of processed frames (the transport's video track)
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn write_frame(&self, frame: &VideoFrame) -> Result<(), MediaError>;
}

/// Sink that drops every frame
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl FrameSink for NullSink {
    async fn write_frame(&self, _frame: &VideoFrame) -> Result<(), MediaError> {
        Ok(())
    }
}
