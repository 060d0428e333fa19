//! Grayscale images and pyramids for multi-scale tracking.

use rayon::prelude::*;
use vidstab_core::{FrameBuffer, PixelFormat};

/// A grayscale image stored as f32 values [0, 1].
#[derive(Debug, Clone)]
pub struct GrayImage {
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl GrayImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0.0; width as usize * height as usize],
            width,
            height,
        }
    }

    /// Build from a closure evaluated at every pixel.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut img = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.data[(y * width + x) as usize] = f(x, y);
            }
        }
        img
    }

    /// Pixel with coordinates clamped to the border.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        let x = x.clamp(0, self.width as i32 - 1) as u32;
        let y = y.clamp(0, self.height as i32 - 1) as u32;
        self.data[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, val: f32) {
        if x < self.width && y < self.height {
            self.data[(y * self.width + x) as usize] = val;
        }
    }

    /// Bilinear sample at a sub-pixel position, border clamped.
    #[inline]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);
        let top = self.get(x0, y0) * (1.0 - fx) + self.get(x0 + 1, y0) * fx;
        let bottom = self.get(x0, y0 + 1) * (1.0 - fx) + self.get(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// True when the position lies inside the image.
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width - 1) as f32 && y <= (self.height - 1) as f32
    }

    /// Half-resolution copy using 2x2 box averaging.
    pub fn downsample(&self) -> Self {
        let nw = self.width.div_ceil(2);
        let nh = self.height.div_ceil(2);
        let mut level = GrayImage::new(nw, nh);
        level
            .data
            .par_chunks_mut(nw as usize)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = (y * 2) as i32;
                for (x, out) in row.iter_mut().enumerate() {
                    let sx = (x * 2) as i32;
                    *out = (self.get(sx, sy)
                        + self.get(sx + 1, sy)
                        + self.get(sx, sy + 1)
                        + self.get(sx + 1, sy + 1))
                        * 0.25;
                }
            });
        level
    }
}

/// Multi-scale image pyramid, level 0 is full resolution.
pub struct ImagePyramid {
    pub levels: Vec<GrayImage>,
}

impl ImagePyramid {
    /// Build up to `num_levels` levels, stopping early once a level would
    /// get smaller than `min_size` on either axis.
    pub fn build(gray: &GrayImage, num_levels: u32, min_size: u32) -> Self {
        let mut levels = vec![gray.clone()];
        while levels.len() < num_levels.max(1) as usize {
            let Some(prev) = levels.last() else { break };
            if prev.width / 2 < min_size || prev.height / 2 < min_size {
                break;
            }
            let next = prev.downsample();
            levels.push(next);
        }
        Self { levels }
    }
}

/// Convert an RGB, RGBA or gray frame to a grayscale image (BT.601 luma).
pub fn rgb_to_gray(frame: &FrameBuffer) -> GrayImage {
    let mut gray = GrayImage::new(frame.width, frame.height);
    match frame.format {
        PixelFormat::Gray8 => {
            for (dst, &src) in gray.data.iter_mut().zip(&frame.data) {
                *dst = src as f32 / 255.0;
            }
        }
        PixelFormat::Rgb8 => {
            if let Some(pixels) = frame.rgb_pixels() {
                gray.data
                    .par_iter_mut()
                    .zip(pixels.par_iter())
                    .for_each(|(dst, &[r, g, b])| *dst = luma(r, g, b));
            }
        }
        PixelFormat::Rgba8 => {
            if let Some(pixels) = frame.rgba_pixels() {
                gray.data
                    .par_iter_mut()
                    .zip(pixels.par_iter())
                    .for_each(|(dst, &[r, g, b, _])| *dst = luma(r, g, b));
            }
        }
    }
    gray
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> f32 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
}

/// Compute spatial gradients (Ix, Iy) using central differences.
pub fn compute_gradients(img: &GrayImage) -> (Vec<f32>, Vec<f32>) {
    let w = img.width as usize;
    let size = w * img.height as usize;
    let mut ix = vec![0.0f32; size];
    let mut iy = vec![0.0f32; size];
    ix.par_chunks_mut(w)
        .zip(iy.par_chunks_mut(w))
        .enumerate()
        .for_each(|(y, (row_x, row_y))| {
            let y = y as i32;
            for x in 0..w {
                let xi = x as i32;
                row_x[x] = (img.get(xi + 1, y) - img.get(xi - 1, y)) * 0.5;
                row_y[x] = (img.get(xi, y + 1) - img.get(xi, y - 1)) * 0.5;
            }
        });
    (ix, iy)
}
