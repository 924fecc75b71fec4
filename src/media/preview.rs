//! Local preview surface
//!
//! Debugging aid only; never part of the negotiated session. The snapshot
//! surface rewrites a PNG on disk every N frames.

use super::MediaError;
use crate::capture::VideoFrame;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Sink for locally processed frames
pub trait PreviewSurface: Send {
    fn show(&mut self, frame: &VideoFrame) -> Result<(), MediaError>;

    /// Tear the surface down. Idempotent.
    fn release(&mut self);
}

/// Writes the latest processed frame to a PNG file
pub struct SnapshotPreview {
    path: PathBuf,
    interval: u64,
    shown: u64,
    released: bool,
}

impl SnapshotPreview {
    pub fn new(path: impl Into<PathBuf>, interval: u64) -> Self {
        let path = path.into();
        info!("Preview snapshots -> {}", path.display());
        Self {
            path,
            interval: interval.max(1),
            shown: 0,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreviewSurface for SnapshotPreview {
    fn show(&mut self, frame: &VideoFrame) -> Result<(), MediaError> {
        if self.released {
            return Ok(());
        }
        let due = self.shown % self.interval == 0;
        self.shown += 1;
        if !due {
            return Ok(());
        }

        // Write next to the target and rename so readers never see a partial file
        let tmp = self.path.with_extension("png.tmp");
        frame
            .image
            .save_with_format(&tmp, image::ImageFormat::Png)
            .map_err(|e| MediaError::Preview(format!("Failed to write {}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| MediaError::Preview(format!("Failed to publish {}: {}", self.path.display(), e)))?;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            debug!("Preview surface released after {} frames", self.shown);
            self.released = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_every_nth_frame_and_stops_after_release() {
        let path = std::env::temp_dir().join(format!("lumen-preview-{}.png", uuid::Uuid::new_v4()));
        let mut preview = SnapshotPreview::new(&path, 2);
        let frame = VideoFrame::blank(8, 8);

        preview.show(&frame).unwrap();
        assert!(path.exists());
        std::fs::remove_file(&path).unwrap();

        preview.show(&frame).unwrap();
        assert!(!path.exists());

        preview.release();
        preview.release();
        preview.show(&frame).unwrap();
        assert!(!path.exists());
    }
}
