//! Shi-Tomasi corner detection.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pyramid::{compute_gradients, GrayImage};

/// Corner detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerParams {
    pub max_corners: usize,
    /// Fraction of the strongest response a corner must reach.
    pub quality_level: f32,
    /// Minimum Euclidean distance between two returned corners.
    pub min_distance: f32,
    /// Side of the square used to accumulate the structure tensor.
    pub block_size: u32,
}

impl Default for CornerParams {
    fn default() -> Self {
        Self {
            max_corners: 200,
            quality_level: 0.01,
            min_distance: 30.0,
            block_size: 3,
        }
    }
}

/// Regions excluded from corner detection, typically moving foreground.
///
/// The mask may have a different size than the analyzed frames, in which case
/// it is stretched over the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingMask {
    width: u32,
    height: u32,
    excluded: Vec<bool>,
}

impl TrackingMask {
    pub fn new(width: u32, height: u32, excluded: Vec<bool>) -> Option<Self> {
        if width == 0 || height == 0 || excluded.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            excluded,
        })
    }

    /// Build from 8-bit luma, every non-zero pixel is excluded.
    pub fn from_luma(width: u32, height: u32, luma: &[u8]) -> Option<Self> {
        Self::new(width, height, luma.iter().map(|&v| v != 0).collect())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether pixel `(x, y)` of a `frame_w` x `frame_h` frame is excluded.
    pub fn is_excluded(&self, x: u32, y: u32, frame_w: u32, frame_h: u32) -> bool {
        if frame_w == 0 || frame_h == 0 {
            return false;
        }
        let mx = (x as u64 * self.width as u64 / frame_w as u64).min(self.width as u64 - 1);
        let my = (y as u64 * self.height as u64 / frame_h as u64).min(self.height as u64 - 1);
        self.excluded[(my * self.width as u64 + mx) as usize]
    }
}

/// A detected corner with its minimum-eigenvalue response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: f32,
    pub y: f32,
    pub response: f32,
}

/// Minimum eigenvalue of the gradient structure tensor at every pixel.
pub fn min_eigen_response(img: &GrayImage, block_size: u32) -> Vec<f32> {
    let w = img.width as usize;
    let h = img.height as usize;
    let (ix, iy) = compute_gradients(img);
    let r = (block_size / 2) as i32;
    let mut response = vec![0.0f32; w * h];

    response
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut gxx = 0.0f32;
                let mut gxy = 0.0f32;
                let mut gyy = 0.0f32;
                for dy in -r..=r {
                    let sy = (y as i32 + dy).clamp(0, h as i32 - 1) as usize;
                    for dx in -r..=r {
                        let sx = (x as i32 + dx).clamp(0, w as i32 - 1) as usize;
                        let gx = ix[sy * w + sx];
                        let gy = iy[sy * w + sx];
                        gxx += gx * gx;
                        gxy += gx * gy;
                        gyy += gy * gy;
                    }
                }
                let half_trace = (gxx + gyy) * 0.5;
                let diff = (gxx - gyy) * 0.5;
                *out = (half_trace - (diff * diff + gxy * gxy).sqrt()).max(0.0);
            }
        });
    response
}

/// Find strong corners, strongest first.
///
/// Candidates must reach `quality_level` times the best response, be a local
/// maximum in their 3x3 neighbourhood and keep `min_distance` from every
/// stronger accepted corner. Masked pixels are never chosen.
pub fn good_features_to_track(
    img: &GrayImage,
    params: &CornerParams,
    mask: Option<&TrackingMask>,
) -> Vec<Corner> {
    if img.width < 3 || img.height < 3 || params.max_corners == 0 {
        return Vec::new();
    }
    let w = img.width as usize;
    let h = img.height as usize;
    let response = min_eigen_response(img, params.block_size);

    let allowed = |x: usize, y: usize| match mask {
        Some(m) => !m.is_excluded(x as u32, y as u32, img.width, img.height),
        None => true,
    };

    let max_response = response
        .iter()
        .enumerate()
        .filter(|(i, _)| allowed(i % w, i / w))
        .map(|(_, &r)| r)
        .fold(0.0f32, f32::max);
    if max_response <= 0.0 {
        return Vec::new();
    }
    let threshold = max_response * params.quality_level;

    let mut candidates: Vec<Corner> = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let r = response[y * w + x];
            if r < threshold || r <= 0.0 || !allowed(x, y) {
                continue;
            }
            let is_peak = (-1i32..=1).all(|dy| {
                (-1i32..=1).all(|dx| {
                    let ny = (y as i32 + dy) as usize;
                    let nx = (x as i32 + dx) as usize;
                    response[ny * w + nx] <= r
                })
            });
            if is_peak {
                candidates.push(Corner {
                    x: x as f32,
                    y: y as f32,
                    response: r,
                });
            }
        }
    }

    candidates.sort_by(|a, b| b.response.total_cmp(&a.response));

    let min_d2 = params.min_distance * params.min_distance;
    let mut corners: Vec<Corner> = Vec::with_capacity(params.max_corners);
    for c in candidates {
        let far_enough = corners.iter().all(|k| {
            let dx = k.x - c.x;
            let dy = k.y - c.y;
            dx * dx + dy * dy >= min_d2
        });
        if far_enough {
            corners.push(c);
            if corners.len() >= params.max_corners {
                break;
            }
        }
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squares(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if ((x / 16) + (y / 16)) % 2 == 0 {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_flat_image_has_no_corners() {
        let img = GrayImage::new(64, 64);
        let corners = good_features_to_track(&img, &CornerParams::default(), None);
        assert!(corners.is_empty());
    }

    #[test]
    fn test_checkerboard_corners_respect_distance() {
        let img = squares(128, 128);
        let params = CornerParams::default();
        let corners = good_features_to_track(&img, &params, None);
        assert!(!corners.is_empty());
        assert!(corners.len() <= params.max_corners);
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                let d = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                assert!(d >= params.min_distance);
            }
        }
        assert!(corners.windows(2).all(|p| p[0].response >= p[1].response));
    }

    #[test]
    fn test_max_corners_limit() {
        let img = squares(256, 256);
        let params = CornerParams {
            max_corners: 5,
            min_distance: 4.0,
            ..CornerParams::default()
        };
        let corners = good_features_to_track(&img, &params, None);
        assert_eq!(corners.len(), 5);
    }

    #[test]
    fn test_mask_excludes_region() {
        let img = squares(128, 128);
        let mut excluded = vec![false; 128 * 128];
        for y in 0..128 {
            for x in 0..64 {
                excluded[y * 128 + x] = true;
            }
        }
        let mask = TrackingMask::new(128, 128, excluded).unwrap();
        let corners = good_features_to_track(&img, &CornerParams::default(), Some(&mask));
        assert!(!corners.is_empty());
        assert!(corners.iter().all(|c| c.x >= 64.0));
    }

    #[test]
    fn test_mask_is_stretched_over_frame() {
        let mask = TrackingMask::from_luma(2, 1, &[255, 0]).unwrap();
        assert!(mask.is_excluded(10, 5, 100, 50));
        assert!(!mask.is_excluded(60, 5, 100, 50));
        assert!(TrackingMask::from_luma(2, 2, &[0]).is_none());
    }
}
