//! Media pipeline
//!
//! Pulls frames from the capture source at a fixed rate, runs the
//! tier-selected filter, stamps the diagnostic overlay and hands the frame
//! to the transport sink. The pipeline owns the capture device and the
//! preview surface; nothing else touches them.

use super::filter::{filter_for_tier, FrameFilter};
use super::overlay::draw_diagnostics;
use super::preview::PreviewSurface;
use super::FrameSink;
use crate::capture::{CaptureError, CaptureSource, FrameClock, FrameStats, VideoFrame};
use crate::config::MediaConfig;
use crate::hardware::{HardwareProfile, HardwareTier};
use image::RgbImage;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::task;
use tokio::time::{self, MissedTickBehavior};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Target framerate
    pub frame_rate: u32,
    /// Timeout for one capture read
    pub capture_timeout: Duration,
    /// Frames between performance log lines
    pub perf_log_interval: u64,
}

impl From<&MediaConfig> for PipelineConfig {
    fn from(config: &MediaConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            frame_rate: config.frame_rate,
            capture_timeout: config.capture_timeout(),
            perf_log_interval: config.perf_log_interval,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&MediaConfig::default())
    }
}

/// Tier-adaptive video pipeline
pub struct MediaPipeline {
    config: PipelineConfig,
    tier: HardwareTier,
    source: Box<dyn CaptureSource>,
    filter: Box<dyn FrameFilter>,
    preview: Option<Box<dyn PreviewSurface>>,
    frame: VideoFrame,
    clock: FrameClock,
    frame_count: u64,
    consecutive_failures: u64,
    last_latency_ms: f64,
    stats: FrameStats,
    released: bool,
}

impl MediaPipeline {
    /// Create a pipeline for the given profile; the filter follows the tier
    pub fn new(config: PipelineConfig, profile: &HardwareProfile, source: Box<dyn CaptureSource>) -> Self {
        let filter = filter_for_tier(profile.tier);
        info!(
            "Media pipeline initialized on tier {} ({}, source {}, {}x{}@{}fps)",
            profile.tier,
            filter.name(),
            source.name(),
            config.width,
            config.height,
            config.frame_rate
        );

        Self {
            frame: VideoFrame::blank(config.width, config.height),
            clock: FrameClock::new(config.frame_rate),
            config,
            tier: profile.tier,
            source,
            filter,
            preview: None,
            frame_count: 0,
            consecutive_failures: 0,
            last_latency_ms: 0.0,
            stats: FrameStats::default(),
            released: false,
        }
    }

    /// Replace the tier filter
    pub fn with_filter(mut self, filter: Box<dyn FrameFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Attach a preview surface
    pub fn with_preview(mut self, preview: Box<dyn PreviewSurface>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn last_latency_ms(&self) -> f64 {
        self.last_latency_ms
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Produce the next processed frame.
    ///
    /// Never fails: a failed or timed-out capture read yields a blank frame
    /// that still carries the overlay and the next timestamp.
    pub async fn next_frame(&mut self) -> &VideoFrame {
        let pts = self.clock.tick();

        let (width, height) = (self.config.width, self.config.height);
        if self.frame.image.dimensions() != (width, height) {
            self.frame.image = RgbImage::new(width, height);
        }

        let read = time::timeout(self.config.capture_timeout, self.source.read(&mut self.frame.image)).await;
        let substituted = match read {
            Ok(Ok(())) => {
                if self.consecutive_failures > 0 {
                    info!("Capture recovered after {} failed reads", self.consecutive_failures);
                }
                self.consecutive_failures = 0;
                false
            }
            Ok(Err(e)) => {
                self.note_capture_failure(&e);
                true
            }
            Err(_) => {
                self.note_capture_failure(&CaptureError::Timeout(self.config.capture_timeout));
                true
            }
        };
        if substituted {
            self.frame.clear();
        }

        let start = Instant::now();
        apply_filter(self.filter.as_ref(), &mut self.frame.image);
        let elapsed = start.elapsed();
        let latency_ms = elapsed.as_secs_f64() * 1000.0;

        draw_diagnostics(&mut self.frame.image, self.tier, latency_ms);

        if self.frame_count % self.config.perf_log_interval.max(1) == 0 {
            info!(
                "[PERF] Frame {}: {:.2} ms (tier={}, filter={}, blank={})",
                self.frame_count,
                latency_ms,
                self.tier,
                self.filter.name(),
                substituted
            );
        }

        self.frame.pts = pts;
        self.frame.sequence = self.frame_count;
        self.frame.substituted = substituted;
        self.last_latency_ms = latency_ms;
        self.stats.record_frame(substituted, elapsed.as_micros() as u64);
        self.frame_count += 1;

        if let Some(preview) = self.preview.as_mut() {
            if let Err(e) = preview.show(&self.frame) {
                warn!("{}", e);
            }
        }

        &self.frame
    }

    fn note_capture_failure(&mut self, error: &CaptureError) {
        self.consecutive_failures += 1;
        if self.consecutive_failures == 1 {
            warn!("{}; substituting blank frames", error);
        } else {
            debug!("{} ({} consecutive)", error, self.consecutive_failures);
        }
    }

    /// Drive the pipeline at the configured rate until `shutdown` flips to
    /// true, then release the device and return the final statistics.
    pub async fn run(mut self, sink: Arc<dyn FrameSink>, mut shutdown: watch::Receiver<bool>) -> FrameStats {
        let period = Duration::from_secs_f64(1.0 / self.config.frame_rate.max(1) as f64);
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sink_errors = 0u64;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let frame = self.next_frame().await;
                    if let Err(e) = sink.write_frame(frame).await {
                        sink_errors += 1;
                        if sink_errors == 1 || sink_errors % 100 == 0 {
                            debug!("Frame sink rejected frame ({} total): {}", sink_errors, e);
                        }
                    }
                }
            }
        }

        self.release();
        self.stats.clone()
    }

    /// Release the capture device and preview surface. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.source.release();
        if let Some(preview) = self.preview.as_mut() {
            preview.release();
        }
        self.released = true;
        info!(
            "Media pipeline released after {} frames ({} blank, avg {} us)",
            self.stats.total_frames,
            self.stats.substituted_frames,
            self.stats.average_process_time_us()
        );
    }
}

/// Run a filter without stalling the other tasks on this worker
fn apply_filter(filter: &dyn FrameFilter, image: &mut RgbImage) {
    // block_in_place is only legal on the multi-threaded scheduler
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(|| filter.apply(image))
        }
        _ => filter.apply(image),
    }
}

impl Drop for MediaPipeline {
    fn drop(&mut self) {
        self.release();
    }
}
