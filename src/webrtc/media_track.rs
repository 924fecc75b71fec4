//! H.264 video track
//!
//! Encodes processed frames with openh264 and writes them to a
//! `TrackLocalStaticSample`, which handles RTP packetization. Each NAL unit
//! goes out as its own sample; only the last one of a frame advances the
//! RTP clock.

use super::TrackSpec;
use crate::capture::VideoFrame;
use crate::media::{FrameSink, MediaError};
use async_trait::async_trait;
use log::{debug, trace};
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::media_engine::MIME_TYPE_H264;
use webrtc::media::io::h264_reader::H264Reader;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// RTP clock rate for video
pub const H264_CLOCK_RATE: u32 = 90_000;

/// Constrained baseline, packetization mode 1
pub const H264_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";

const MAX_NAL_BUFFER: usize = 1024 * 1024;

pub fn h264_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_H264.to_string(),
        clock_rate: H264_CLOCK_RATE,
        channels: 0,
        sdp_fmtp_line: H264_FMTP.to_string(),
        rtcp_feedback: vec![],
    }
}

/// Track statistics
#[derive(Debug, Clone, Default)]
pub struct TrackStats {
    pub frames_sent: u64,
    pub keyframes_sent: u64,
    pub bytes_sent: u64,
    pub write_errors: u64,
}

/// Frame sink feeding an H.264 sample track
pub struct H264TrackSink {
    track: Arc<TrackLocalStaticSample>,
    encoder: Mutex<Encoder>,
    width: u32,
    height: u32,
    frame_duration: Duration,
    stats: Mutex<TrackStats>,
}

impl H264TrackSink {
    pub fn new(spec: &TrackSpec) -> Result<Self, MediaError> {
        if spec.width == 0 || spec.height == 0 || spec.width % 2 != 0 || spec.height % 2 != 0 {
            return Err(MediaError::Encode(format!(
                "H.264 needs even, non-zero dimensions (got {}x{})",
                spec.width, spec.height
            )));
        }
        let encoder = Encoder::new().map_err(|e| MediaError::Encode(format!("Failed to create encoder: {}", e)))?;

        let track = Arc::new(TrackLocalStaticSample::new(
            h264_capability(),
            format!("video-{}", uuid::Uuid::new_v4()),
            spec.stream_id.clone(),
        ));

        Ok(Self {
            track,
            encoder: Mutex::new(encoder),
            width: spec.width,
            height: spec.height,
            frame_duration: Duration::from_secs_f64(1.0 / spec.frame_rate.max(1) as f64),
            stats: Mutex::new(TrackStats::default()),
        })
    }

    pub fn track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    pub fn stats(&self) -> TrackStats {
        self.stats.lock().clone()
    }

    /// Encode one frame to an Annex B access unit
    fn encode(&self, frame: &VideoFrame) -> Result<(Vec<u8>, bool), MediaError> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(MediaError::Encode(format!(
                "Frame is {}x{}, track expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let yuv = rgb_to_i420(frame.image.as_raw(), self.width as usize, self.height as usize);
        let buffer = YUVBuffer::from_vec(yuv, self.width as usize, self.height as usize);

        let mut encoder = self.encoder.lock();
        let bitstream = encoder
            .encode(&buffer)
            .map_err(|e| MediaError::Encode(format!("Encoding failed: {}", e)))?;
        let keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        Ok((bitstream.to_vec(), keyframe))
    }
}

#[async_trait]
impl FrameSink for H264TrackSink {
    async fn write_frame(&self, frame: &VideoFrame) -> Result<(), MediaError> {
        let (data, keyframe) = self.encode(frame)?;
        if data.is_empty() {
            // rate control skipped this frame
            return Ok(());
        }

        let mut reader = H264Reader::new(Cursor::new(data), MAX_NAL_BUFFER);
        let mut nals = Vec::new();
        while let Ok(nal) = reader.next_nal() {
            if nal.data.is_empty() {
                continue;
            }
            nals.push(nal.data.freeze());
        }

        let count = nals.len();
        let mut bytes = 0u64;
        let mut failed = false;
        for (index, nal) in nals.into_iter().enumerate() {
            bytes += nal.len() as u64;
            let duration = if index + 1 == count {
                self.frame_duration
            } else {
                Duration::ZERO
            };
            let sample = Sample {
                data: nal,
                duration,
                ..Default::default()
            };
            if let Err(e) = self.track.write_sample(&sample).await {
                failed = true;
                trace!("Write sample failed (no peer?): {}", e);
            }
        }

        let mut stats = self.stats.lock();
        if failed {
            stats.write_errors += 1;
            if stats.write_errors % 100 == 1 {
                debug!("Video track write failures: {}", stats.write_errors);
            }
        }
        stats.frames_sent += 1;
        stats.bytes_sent += bytes;
        if keyframe {
            stats.keyframes_sent += 1;
        }
        trace!(
            "Sent frame {}: {} NAL units, {} bytes, keyframe={}",
            frame.sequence,
            count,
            bytes,
            keyframe
        );
        Ok(())
    }
}

/// RGB24 to planar I420 (BT.601, studio range), chroma averaged over 2x2 blocks
pub fn rgb_to_i420(rgb: &[u8], width: usize, height: usize) -> Vec<u8> {
    let luma_size = width * height;
    let chroma_width = width / 2;
    let chroma_size = chroma_width * (height / 2);
    let mut out = vec![0u8; luma_size + chroma_size * 2];
    let (luma, chroma) = out.split_at_mut(luma_size);
    let (u_plane, v_plane) = chroma.split_at_mut(chroma_size);

    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) * 3;
            let (r, g, b) = (rgb[i] as i32, rgb[i + 1] as i32, rgb[i + 2] as i32);
            luma[y * width + x] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8;
        }
    }

    for cy in 0..height / 2 {
        for cx in 0..chroma_width {
            let (mut r, mut g, mut b) = (0i32, 0i32, 0i32);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let i = ((cy * 2 + dy) * width + cx * 2 + dx) * 3;
                r += rgb[i] as i32;
                g += rgb[i + 1] as i32;
                b += rgb[i + 2] as i32;
            }
            let (r, g, b) = (r / 4, g / 4, b / 4);
            let index = cy * chroma_width + cx;
            u_plane[index] = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
            v_plane[index] = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
        }
    }

    out
}
