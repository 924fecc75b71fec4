//! Capture source abstraction
//!
//! The physical device is opaque: the pipeline only asks for the next image.

use super::CaptureError;
use crate::config::{CaptureSourceKind, MediaConfig};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use log::debug;

/// Trait for frame source implementations
#[async_trait]
pub trait CaptureSource: Send {
    /// Fill `target` with the next captured image
    async fn read(&mut self, target: &mut RgbImage) -> Result<(), CaptureError>;

    /// Release the device. Idempotent.
    fn release(&mut self);

    /// Human-readable source name
    fn name(&self) -> &str;
}

/// Open the configured source
pub fn open_source(media: &MediaConfig) -> Result<Box<dyn CaptureSource>, CaptureError> {
    let (width, height) = (media.width, media.height);
    if width == 0 || height == 0 {
        return Err(CaptureError::Unavailable(format!(
            "invalid capture size {}x{}",
            width, height
        )));
    }
    debug!("Opening {} capture source at {}x{}", media.source.as_str(), width, height);
    Ok(match media.source {
        CaptureSourceKind::TestPattern => Box::new(TestPatternSource::new()),
        CaptureSourceKind::Camera => open_camera(media.camera_index)?,
        CaptureSourceKind::None => Box::new(UnavailableSource::default()),
    })
}

#[cfg(feature = "camera")]
fn open_camera(index: u32) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Ok(Box::new(super::camera::CameraSource::open(index)?))
}

#[cfg(not(feature = "camera"))]
fn open_camera(index: u32) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Err(CaptureError::Unavailable(format!(
        "camera {} requested but this build has no camera support",
        index
    )))
}

/// Synthetic source drawing scrolling color bars
pub struct TestPatternSource {
    phase: u32,
    released: bool,
}

const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

impl TestPatternSource {
    pub fn new() -> Self {
        Self {
            phase: 0,
            released: false,
        }
    }
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureSource for TestPatternSource {
    async fn read(&mut self, target: &mut RgbImage) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::Released);
        }

        let width = target.width().max(1);
        let bar_width = (width / BARS.len() as u32).max(1);
        let phase = self.phase;
        for (x, y, pixel) in target.enumerate_pixels_mut() {
            let shifted = (x + phase) % width;
            let bar = ((shifted / bar_width) as usize).min(BARS.len() - 1);
            let [r, g, b] = BARS[bar];
            // Light grain so the filters have something to smooth
            let grain = ((x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ phase) & 0x0F) as u8;
            *pixel = Rgb([r.saturating_add(grain), g.saturating_add(grain), b.saturating_add(grain)]);
        }

        self.phase = self.phase.wrapping_add(4);
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            debug!("Test pattern source released");
            self.released = true;
        }
    }

    fn name(&self) -> &str {
        "test-pattern"
    }
}

/// Source with no device behind it; every read fails
#[derive(Debug, Default)]
pub struct UnavailableSource {
    released: bool,
}

#[async_trait]
impl CaptureSource for UnavailableSource {
    async fn read(&mut self, _target: &mut RgbImage) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::Released);
        }
        Err(CaptureError::ReadFailed("no capture device".to_string()))
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_moves_between_reads() {
        let mut source = TestPatternSource::new();
        let mut first = RgbImage::new(64, 8);
        let mut second = RgbImage::new(64, 8);
        source.read(&mut first).await.unwrap();
        source.read(&mut second).await.unwrap();
        assert_ne!(first.as_raw(), second.as_raw());
    }

    #[tokio::test]
    async fn released_source_refuses_reads() {
        let mut source = TestPatternSource::new();
        source.release();
        source.release();
        let mut image = RgbImage::new(4, 4);
        assert!(matches!(source.read(&mut image).await, Err(CaptureError::Released)));
    }

    fn media(source: CaptureSourceKind) -> MediaConfig {
        MediaConfig {
            source,
            width: 64,
            height: 48,
            ..MediaConfig::default()
        }
    }

    #[test]
    fn zero_sized_source_is_unavailable() {
        let mut config = media(CaptureSourceKind::TestPattern);
        config.width = 0;
        assert!(matches!(open_source(&config), Err(CaptureError::Unavailable(_))));
    }

    #[tokio::test]
    async fn configured_sources_open() {
        let mut pattern = open_source(&media(CaptureSourceKind::TestPattern)).unwrap();
        assert_eq!(pattern.name(), "test-pattern");
        let mut image = RgbImage::new(64, 48);
        pattern.read(&mut image).await.unwrap();

        let mut none = open_source(&media(CaptureSourceKind::None)).unwrap();
        assert!(matches!(none.read(&mut image).await, Err(CaptureError::ReadFailed(_))));
    }

    #[test]
    fn missing_camera_is_unavailable() {
        let mut config = media(CaptureSourceKind::Camera);
        config.camera_index = 250;
        assert!(matches!(open_source(&config), Err(CaptureError::Unavailable(_))));
    }
}
