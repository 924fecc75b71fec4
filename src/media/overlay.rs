//! Diagnostic overlay
//!
//! Draws the tier label and processing latency onto the frame with a built-in
//! 5x7 bitmap font, so the overlay has no font-file dependency.

use crate::hardware::HardwareTier;
use image::{Rgb, RgbImage};

/// Overlay text color
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Top-left corner of the first overlay line
pub const OVERLAY_ORIGIN: (u32, u32) = (10, 10);

/// Pixel scale applied to each glyph cell
pub const OVERLAY_SCALE: u32 = 2;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const LINE_ADVANCE: u32 = (GLYPH_HEIGHT + 1) * OVERLAY_SCALE;
const CHAR_ADVANCE: u32 = (GLYPH_WIDTH + 1) * OVERLAY_SCALE;

/// The two overlay lines for a frame
pub fn overlay_lines(tier: HardwareTier, latency_ms: f64) -> [String; 2] {
    [
        format!("TIER: {}", tier.label()),
        format!("PROC: {:.2}MS", latency_ms),
    ]
}

/// Draw tier and latency at the overlay origin
pub fn draw_diagnostics(image: &mut RgbImage, tier: HardwareTier, latency_ms: f64) {
    let (x, mut y) = OVERLAY_ORIGIN;
    for line in overlay_lines(tier, latency_ms) {
        draw_text(image, x, y, &line, OVERLAY_COLOR);
        y += LINE_ADVANCE;
    }
}

/// Bounding box `(x, y, width, height)` of the overlay block
pub fn overlay_bounds(tier: HardwareTier, latency_ms: f64) -> (u32, u32, u32, u32) {
    let lines = overlay_lines(tier, latency_ms);
    let longest = lines.iter().map(|l| l.chars().count() as u32).max().unwrap_or(0);
    (
        OVERLAY_ORIGIN.0,
        OVERLAY_ORIGIN.1,
        longest * CHAR_ADVANCE,
        lines.len() as u32 * LINE_ADVANCE,
    )
}

/// Draw `text` with its top-left corner at (x, y). Pixels outside the image are skipped.
pub fn draw_text(image: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
    let mut cursor = x;
    for ch in text.chars() {
        draw_glyph(image, cursor, y, glyph(ch), color);
        cursor = cursor.saturating_add(CHAR_ADVANCE);
    }
}

fn draw_glyph(image: &mut RgbImage, x: u32, y: u32, rows: [u8; 7], color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (0x10 >> col) == 0 {
                continue;
            }
            for sy in 0..OVERLAY_SCALE {
                for sx in 0..OVERLAY_SCALE {
                    let px = x + col * OVERLAY_SCALE + sx;
                    let py = y + row as u32 * OVERLAY_SCALE + sy;
                    if px < width && py < height {
                        image.put_pixel(px, py, color);
                    }
                }
            }
        }
    }
}

#[rustfmt::skip]
fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        // Hollow box for anything outside the font
        _   => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_overlay_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|p| **p == OVERLAY_COLOR).count()
    }

    #[test]
    fn lines_carry_tier_and_latency() {
        let [tier, latency] = overlay_lines(HardwareTier::HighCpu, 3.14159);
        assert_eq!(tier, "TIER: HIGH_CPU");
        assert_eq!(latency, "PROC: 3.14MS");
    }

    #[test]
    fn overlay_stays_inside_its_bounds() {
        let mut image = RgbImage::new(640, 480);
        draw_diagnostics(&mut image, HardwareTier::StandardCpu, 1.5);
        assert!(count_overlay_pixels(&image) > 0);

        let (bx, by, bw, bh) = overlay_bounds(HardwareTier::StandardCpu, 1.5);
        for (x, y, pixel) in image.enumerate_pixels() {
            if *pixel == OVERLAY_COLOR {
                assert!(x >= bx && x < bx + bw && y >= by && y < by + bh);
            }
        }
    }

    #[test]
    fn clipped_on_tiny_images() {
        let mut image = RgbImage::new(12, 12);
        draw_diagnostics(&mut image, HardwareTier::GpuAccel, 0.0);
        assert!(count_overlay_pixels(&image) > 0);
    }
}
