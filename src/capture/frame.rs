//! Video frame data structure
//!
//! A single reusable RGB buffer tagged with its presentation timestamp.

use image::RgbImage;
use std::fmt;

/// RTP video clock rate
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Rational time base of a presentation timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    pub const VIDEO: TimeBase = TimeBase {
        num: 1,
        den: VIDEO_CLOCK_RATE,
    };

    /// Convert a timestamp in this base to seconds
    pub fn seconds(&self, pts: i64) -> f64 {
        pts as f64 * self.num as f64 / self.den as f64
    }
}

/// Processed video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Pixel data (RGB8)
    pub image: RgbImage,

    /// Presentation timestamp in `time_base` units
    pub pts: i64,

    /// Time base of `pts`
    pub time_base: TimeBase,

    /// Frame sequence number
    pub sequence: u64,

    /// True if the capture read failed and the frame was blanked
    pub substituted: bool,
}

impl VideoFrame {
    /// Black frame of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
            pts: 0,
            time_base: TimeBase::VIDEO,
            sequence: 0,
            substituted: true,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Zero every pixel in place
    pub fn clear(&mut self) {
        for byte in self.image.iter_mut() {
            *byte = 0;
        }
    }
}

impl fmt::Display for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame({}x{}, pts={}, seq={}{})",
            self.width(),
            self.height(),
            self.pts,
            self.sequence,
            if self.substituted { ", blank" } else { "" }
        )
    }
}

/// Fixed-rate presentation clock
#[derive(Debug, Clone)]
pub struct FrameClock {
    step: i64,
    next_pts: i64,
}

impl FrameClock {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            step: (VIDEO_CLOCK_RATE / frame_rate.max(1)) as i64,
            next_pts: 0,
        }
    }

    /// Timestamp for the next frame
    pub fn tick(&mut self) -> i64 {
        let pts = self.next_pts;
        self.next_pts += self.step;
        pts
    }
}

/// Frame statistics for monitoring
#[derive(Debug, Default, Clone)]
pub struct FrameStats {
    /// Total frames produced
    pub total_frames: u64,

    /// Frames replaced by a blank frame
    pub substituted_frames: u64,

    /// Total transform time in microseconds
    pub total_process_time_us: u64,

    /// Last transform time in microseconds
    pub last_process_time_us: u64,
}

impl FrameStats {
    /// Record a produced frame
    pub fn record_frame(&mut self, substituted: bool, time_us: u64) {
        self.total_frames += 1;
        if substituted {
            self.substituted_frames += 1;
        }
        self.last_process_time_us = time_us;
        self.total_process_time_us += time_us;
    }

    pub fn average_process_time_us(&self) -> u64 {
        if self.total_frames == 0 {
            0
        } else {
            self.total_process_time_us / self.total_frames
        }
    }
}
