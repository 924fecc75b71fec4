//! Local camera source
//!
//! The device handle lives on its own thread for its whole lifetime; frames
//! reach the pipeline through a two-slot channel so a slow consumer only
//! ever sees recent images.

use super::capturer::CaptureSource;
use super::CaptureError;
use async_trait::async_trait;
use image::{imageops, RgbImage};
use log::{debug, info, warn};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use tokio::sync::mpsc;

type FrameResult = Result<RgbImage, CaptureError>;

/// Camera opened by device index
pub struct CameraSource {
    name: String,
    frames: mpsc::Receiver<FrameResult>,
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    released: bool,
}

impl CameraSource {
    /// Open camera `index` and start streaming
    pub fn open(index: u32) -> Result<Self, CaptureError> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (frame_tx, frames) = mpsc::channel(2);
        let stop = Arc::new(AtomicBool::new(false));

        let worker_stop = stop.clone();
        let worker = thread::Builder::new()
            .name(format!("camera-{}", index))
            .spawn(move || capture_loop(index, ready_tx, frame_tx, worker_stop))
            .map_err(|e| CaptureError::Unavailable(format!("camera thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(name)) => {
                info!("Camera {} opened: {}", index, name);
                Ok(Self {
                    name,
                    frames,
                    stop,
                    worker: Some(worker),
                    released: false,
                })
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::Unavailable(format!(
                "camera {} thread exited during open",
                index
            ))),
        }
    }
}

fn open_camera(index: u32) -> Result<Camera, CaptureError> {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
    let mut camera = Camera::new(CameraIndex::Index(index), requested)
        .map_err(|e| CaptureError::Unavailable(format!("camera {}: {}", index, e)))?;
    camera
        .open_stream()
        .map_err(|e| CaptureError::Unavailable(format!("camera {} stream: {}", index, e)))?;
    Ok(camera)
}

fn capture_loop(
    index: u32,
    ready: std_mpsc::Sender<Result<String, CaptureError>>,
    frames: mpsc::Sender<FrameResult>,
    stop: Arc<AtomicBool>,
) {
    let mut camera = match open_camera(index) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(camera.info().human_name())).is_err() {
        return;
    }

    while !stop.load(Ordering::Relaxed) {
        let frame = camera
            .frame()
            .map_err(|e| CaptureError::ReadFailed(e.to_string()))
            .and_then(|buffer| {
                let resolution = buffer.resolution();
                let mut raw = vec![0u8; (resolution.width_x * resolution.height_y * 3) as usize];
                buffer
                    .decode_image_to_buffer::<RgbFormat>(&mut raw)
                    .map_err(|e| CaptureError::ReadFailed(e.to_string()))?;
                RgbImage::from_raw(resolution.width_x, resolution.height_y, raw)
                    .ok_or_else(|| CaptureError::ReadFailed("short camera frame".to_string()))
            });
        if frames.blocking_send(frame).is_err() {
            break;
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Camera {} did not stop cleanly: {}", index, e);
    }
    debug!("Camera {} thread finished", index);
}

#[async_trait]
impl CaptureSource for CameraSource {
    async fn read(&mut self, target: &mut RgbImage) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::Released);
        }
        let image = match self.frames.recv().await {
            Some(frame) => frame?,
            None => return Err(CaptureError::ReadFailed("camera stream ended".to_string())),
        };
        if image.dimensions() == target.dimensions() {
            target.copy_from_slice(image.as_raw());
        } else {
            *target = imageops::resize(&image, target.width(), target.height(), imageops::FilterType::Triangle);
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stop.store(true, Ordering::Relaxed);
        self.frames.close();
        // The thread may still be inside a device read; let it wind down on its own
        self.worker.take();
        debug!("Camera {} released", self.name);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}
