//! Synthetic footage shared by the integration tests.

use vidstab_core::{FrameBuffer, FrameRate, PixelFormat};
use vidstab_media::MemorySource;

pub const WIDTH: u32 = 200;
pub const HEIGHT: u32 = 150;

/// Smooth texture with plenty of corners, values in 0.1..0.9.
pub fn texture(x: f32, y: f32) -> f32 {
    0.5 + 0.25 * (x / 7.0).sin() * (y / 9.0).cos() + 0.15 * ((x + y) / 13.0).sin()
}

/// The texture seen by a camera displaced by `(shift_x, shift_y)`.
pub fn shifted_frame(width: u32, height: u32, shift_x: f32, shift_y: f32) -> FrameBuffer {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            let v = texture(x as f32 - shift_x, y as f32 - shift_y);
            let byte = (v * 255.0).round().clamp(0.0, 255.0) as u8;
            data.extend_from_slice(&[byte, byte, byte]);
        }
    }
    FrameBuffer { format: PixelFormat::Rgb8, width, height, data }
}

/// `count` frames of content moving `step_x` pixels per frame.
pub fn panning_frames(count: usize, step_x: f32) -> Vec<FrameBuffer> {
    (0..count)
        .map(|i| shifted_frame(WIDTH, HEIGHT, step_x * i as f32, 0.0))
        .collect()
}

pub fn panning_source(count: usize, step_x: f32, rate: FrameRate) -> MemorySource {
    MemorySource::new("synthetic", rate, panning_frames(count, step_x))
        .unwrap_or_else(|e| panic!("synthetic source: {e}"))
}
