//! Re-rendering frames with a corrective affine and zoom crop.

use glam::{DAffine2, DVec2};
use rayon::prelude::*;
use vidstab_core::{center_zoom, CorrectiveTransform, FrameBuffer};

use crate::crop::needs_zoom;

/// Applies corrections to frames, one frame at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameWarper {
    /// Value written to pixels that map outside the source.
    pub border: u8,
}

impl FrameWarper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward transform: correction first, then the centered zoom.
    pub fn transform(
        &self,
        width: u32,
        height: u32,
        correction: CorrectiveTransform,
        crop: f64,
    ) -> DAffine2 {
        let m = correction.to_affine();
        if needs_zoom(crop) {
            let center = DVec2::new(width as f64 / 2.0, height as f64 / 2.0);
            center_zoom(crop, center) * m
        } else {
            m
        }
    }

    /// Corrected frame of the same size and format.
    pub fn render(
        &self,
        frame: &FrameBuffer,
        correction: CorrectiveTransform,
        crop: f64,
    ) -> FrameBuffer {
        if correction.magnitude() == 0.0 && !needs_zoom(crop) {
            return frame.clone();
        }
        let forward = self.transform(frame.width, frame.height, correction, crop);
        self.warp(frame, forward)
    }

    /// Inverse-mapped bilinear resample of `frame` under `forward`.
    pub fn warp(&self, frame: &FrameBuffer, forward: DAffine2) -> FrameBuffer {
        let mut out = FrameBuffer::new(frame.width, frame.height, frame.format);
        let inverse = forward.inverse();
        if !inverse.is_finite() {
            out.data.fill(self.border);
            return out;
        }
        let bpp = frame.format.bytes_per_pixel();
        let stride = out.stride();
        let w = frame.width as usize;
        let h = frame.height as usize;
        if w == 0 || h == 0 {
            return out;
        }
        let max_x = (w - 1) as f64;
        let max_y = (h - 1) as f64;
        let src = &frame.data;
        let border = self.border;

        out.data
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..w {
                    let p = inverse.transform_point2(DVec2::new(x as f64, y as f64));
                    let dst = &mut row[x * bpp..(x + 1) * bpp];
                    if !(p.x >= 0.0 && p.y >= 0.0 && p.x <= max_x && p.y <= max_y) {
                        dst.fill(border);
                        continue;
                    }
                    let x0 = p.x.floor() as usize;
                    let y0 = p.y.floor() as usize;
                    let x1 = (x0 + 1).min(w - 1);
                    let y1 = (y0 + 1).min(h - 1);
                    let fx = p.x - x0 as f64;
                    let fy = p.y - y0 as f64;
                    let i00 = (y0 * w + x0) * bpp;
                    let i10 = (y0 * w + x1) * bpp;
                    let i01 = (y1 * w + x0) * bpp;
                    let i11 = (y1 * w + x1) * bpp;
                    for (c, d) in dst.iter_mut().enumerate() {
                        let top = src[i00 + c] as f64 * (1.0 - fx) + src[i10 + c] as f64 * fx;
                        let bottom = src[i01 + c] as f64 * (1.0 - fx) + src[i11 + c] as f64 * fx;
                        *d = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
                    }
                }
            });
        out
    }
}
