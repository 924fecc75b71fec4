//! Tier-selected frame filters
//!
//! | tier         | filter                      |
//! |--------------|-----------------------------|
//! | STANDARD_CPU | 5x5 Gaussian denoise        |
//! | HIGH_CPU     | bilateral (edge-preserving) |
//! | GPU_ACCEL    | detail enhancement          |
//!
//! The GPU tier runs a CPU stand-in; a model-based implementation plugs in
//! behind the same [`FrameFilter`] trait.

use crate::hardware::HardwareTier;
use image::{imageops, RgbImage};

/// In-place image transform
pub trait FrameFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, image: &mut RgbImage);
}

/// Stable tier → filter mapping
pub fn filter_for_tier(tier: HardwareTier) -> Box<dyn FrameFilter> {
    match tier {
        HardwareTier::StandardCpu => Box::new(GaussianDenoise::default()),
        HardwareTier::HighCpu => Box::new(BilateralSmooth::default()),
        HardwareTier::GpuAccel => Box::new(DetailEnhance::default()),
    }
}

/// Low-radius Gaussian blur
#[derive(Debug, Clone)]
pub struct GaussianDenoise {
    pub sigma: f32,
}

impl Default for GaussianDenoise {
    fn default() -> Self {
        // sigma of a 5x5 kernel: 0.3 * ((5 - 1) / 2 - 1) + 0.8
        Self { sigma: 1.1 }
    }
}

impl FrameFilter for GaussianDenoise {
    fn name(&self) -> &'static str {
        "gaussian-denoise"
    }

    fn apply(&self, image: &mut RgbImage) {
        *image = imageops::blur(image, self.sigma);
    }
}

/// Bilateral filter: spatial Gaussian weighted by color similarity
#[derive(Debug, Clone)]
pub struct BilateralSmooth {
    pub radius: i32,
    pub sigma_color: f32,
    pub sigma_space: f32,
}

impl Default for BilateralSmooth {
    fn default() -> Self {
        // diameter 9
        Self {
            radius: 4,
            sigma_color: 75.0,
            sigma_space: 75.0,
        }
    }
}

impl FrameFilter for BilateralSmooth {
    fn name(&self) -> &'static str {
        "bilateral-smooth"
    }

    fn apply(&self, image: &mut RgbImage) {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let width = width as i32;
        let height = height as i32;
        let radius = self.radius.max(1);

        let space_coeff = -0.5 / (self.sigma_space * self.sigma_space);
        let color_coeff = -0.5 / (self.sigma_color * self.sigma_color);

        let mut offsets = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let dist2 = (dx * dx + dy * dy) as f32;
                if dist2.sqrt() > radius as f32 {
                    continue;
                }
                offsets.push((dx, dy, (dist2 * space_coeff).exp()));
            }
        }

        // Color distance is the sum of absolute channel differences
        let color_lut: Vec<f32> = (0..=255 * 3)
            .map(|d| {
                let d = d as f32;
                (d * d * color_coeff).exp()
            })
            .collect();

        let src = image.as_raw().clone();
        let dst: &mut [u8] = &mut *image;
        let stride = width as usize * 3;

        for y in 0..height {
            for x in 0..width {
                let center = y as usize * stride + x as usize * 3;
                let (cr, cg, cb) = (src[center] as i32, src[center + 1] as i32, src[center + 2] as i32);

                let mut sum = [0f32; 3];
                let mut weight_sum = 0f32;
                for &(dx, dy, space_weight) in &offsets {
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || ny < 0 || nx >= width || ny >= height {
                        continue;
                    }
                    let idx = ny as usize * stride + nx as usize * 3;
                    let (r, g, b) = (src[idx] as i32, src[idx + 1] as i32, src[idx + 2] as i32);
                    let diff = ((r - cr).abs() + (g - cg).abs() + (b - cb).abs()) as usize;
                    let weight = space_weight * color_lut[diff];
                    sum[0] += r as f32 * weight;
                    sum[1] += g as f32 * weight;
                    sum[2] += b as f32 * weight;
                    weight_sum += weight;
                }

                for channel in 0..3 {
                    dst[center + channel] = (sum[channel] / weight_sum).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

/// Unsharp-mask detail enhancement
#[derive(Debug, Clone)]
pub struct DetailEnhance {
    pub sigma: f32,
    pub threshold: i32,
}

impl Default for DetailEnhance {
    fn default() -> Self {
        Self {
            sigma: 2.0,
            threshold: 1,
        }
    }
}

impl FrameFilter for DetailEnhance {
    fn name(&self) -> &'static str {
        "detail-enhance"
    }

    fn apply(&self, image: &mut RgbImage) {
        *image = imageops::unsharpen(image, self.sigma, self.threshold);
    }
}
