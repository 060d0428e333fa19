//! Pyramidal Lucas-Kanade point tracker.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::pyramid::{GrayImage, ImagePyramid};

/// Result of tracking one point into the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub origin: [f32; 2],
    pub position: [f32; 2],
    pub lost: bool,
}

impl TrackPoint {
    fn lost(origin: [f32; 2]) -> Self {
        Self {
            origin,
            position: origin,
            lost: true,
        }
    }
}

/// Lucas-Kanade optical flow point tracker with pyramidal support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointTracker {
    /// Side of the square integration window, kept constant on every level.
    pub window_size: u32,
    pub pyramid_levels: u32,
    pub max_iterations: u32,
    pub epsilon: f32,
    /// Points whose gradient matrix has a smaller minimum eigenvalue
    /// (per window pixel) are reported lost.
    pub min_eigen_threshold: f32,
}

impl PointTracker {
    pub fn new() -> Self {
        Self {
            window_size: 21,
            pyramid_levels: 4,
            max_iterations: 30,
            epsilon: 0.01,
            min_eigen_threshold: 1e-6,
        }
    }

    /// Pyramid suited to this tracker's level count and window.
    pub fn build_pyramid(&self, gray: &GrayImage) -> ImagePyramid {
        ImagePyramid::build(gray, self.pyramid_levels, self.window_size)
    }

    pub fn track(&self, prev: &GrayImage, curr: &GrayImage, points: &[[f32; 2]]) -> Vec<TrackPoint> {
        let prev_pyr = self.build_pyramid(prev);
        let curr_pyr = self.build_pyramid(curr);
        self.track_pyramids(&prev_pyr, &curr_pyr, points)
    }

    /// Track `points` from `prev_pyr` into `curr_pyr`, one result per point.
    pub fn track_pyramids(
        &self,
        prev_pyr: &ImagePyramid,
        curr_pyr: &ImagePyramid,
        points: &[[f32; 2]],
    ) -> Vec<TrackPoint> {
        points
            .par_iter()
            .map(|&p| match self.track_point(prev_pyr, curr_pyr, p) {
                Some(position) => TrackPoint {
                    origin: p,
                    position,
                    lost: false,
                },
                None => TrackPoint::lost(p),
            })
            .collect()
    }

    fn track_point(
        &self,
        prev_pyr: &ImagePyramid,
        curr_pyr: &ImagePyramid,
        position: [f32; 2],
    ) -> Option<[f32; 2]> {
        let levels = prev_pyr.levels.len().min(curr_pyr.levels.len());
        if levels == 0 {
            return None;
        }
        let hw = (self.window_size / 2) as i32;
        let area = ((2 * hw + 1) * (2 * hw + 1)) as f32;
        let mut guess = [0.0f32, 0.0];

        for level in (0..levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let px = position[0] * scale;
            let py = position[1] * scale;
            let prev_img = &prev_pyr.levels[level];
            let curr_img = &curr_pyr.levels[level];

            let side = (2 * hw + 1) as usize;
            let mut patch = Vec::with_capacity(side * side);
            let mut g11 = 0.0f32;
            let mut g12 = 0.0f32;
            let mut g22 = 0.0f32;
            for wy in -hw..=hw {
                for wx in -hw..=hw {
                    let x = px + wx as f32;
                    let y = py + wy as f32;
                    let ix = (prev_img.sample(x + 1.0, y) - prev_img.sample(x - 1.0, y)) * 0.5;
                    let iy = (prev_img.sample(x, y + 1.0) - prev_img.sample(x, y - 1.0)) * 0.5;
                    g11 += ix * ix;
                    g12 += ix * iy;
                    g22 += iy * iy;
                    patch.push((prev_img.sample(x, y), ix, iy));
                }
            }

            let half_trace = (g11 + g22) * 0.5;
            let diff = (g11 - g22) * 0.5;
            let min_eig = half_trace - (diff * diff + g12 * g12).sqrt();
            let det = g11 * g22 - g12 * g12;
            if min_eig / area < self.min_eigen_threshold || det.abs() < f32::EPSILON {
                return None;
            }
            let inv_det = 1.0 / det;

            let mut v = [0.0f32, 0.0];
            for _ in 0..self.max_iterations {
                let cx = px + guess[0] + v[0];
                let cy = py + guess[1] + v[1];
                let mut bx = 0.0f32;
                let mut by = 0.0f32;
                let mut k = 0;
                for wy in -hw..=hw {
                    for wx in -hw..=hw {
                        let (i, ix, iy) = patch[k];
                        k += 1;
                        let it = i - curr_img.sample(cx + wx as f32, cy + wy as f32);
                        bx += it * ix;
                        by += it * iy;
                    }
                }
                let ex = inv_det * (g22 * bx - g12 * by);
                let ey = inv_det * (g11 * by - g12 * bx);
                v[0] += ex;
                v[1] += ey;
                if ex * ex + ey * ey < self.epsilon * self.epsilon {
                    break;
                }
            }

            if !v[0].is_finite() || !v[1].is_finite() {
                return None;
            }
            guess = if level > 0 {
                [2.0 * (guess[0] + v[0]), 2.0 * (guess[1] + v[1])]
            } else {
                [guess[0] + v[0], guess[1] + v[1]]
            };
        }

        let new_pos = [position[0] + guess[0], position[1] + guess[1]];
        let base = &curr_pyr.levels[0];
        base.contains(new_pos[0], new_pos[1]).then_some(new_pos)
    }
}

impl Default for PointTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(shift_x: f32, shift_y: f32) -> GrayImage {
        GrayImage::from_fn(160, 120, |x, y| {
            let x = x as f32 - shift_x;
            let y = y as f32 - shift_y;
            0.5 + 0.25 * (x / 7.0).sin() * (y / 9.0).cos() + 0.15 * ((x + y) / 13.0).sin()
        })
    }

    #[test]
    fn test_stationary_point() {
        let img = texture(0.0, 0.0);
        let tracker = PointTracker::new();
        let out = tracker.track(&img, &img, &[[80.0, 60.0]]);
        assert!(!out[0].lost);
        assert!((out[0].position[0] - 80.0).abs() < 0.05);
        assert!((out[0].position[1] - 60.0).abs() < 0.05);
    }

    #[test]
    fn test_translated_point() {
        let prev = texture(0.0, 0.0);
        let curr = texture(3.0, -2.0);
        let tracker = PointTracker::new();
        let out = tracker.track(&prev, &curr, &[[70.0, 50.0], [90.0, 70.0]]);
        for p in out {
            assert!(!p.lost);
            assert!((p.position[0] - p.origin[0] - 3.0).abs() < 0.2);
            assert!((p.position[1] - p.origin[1] + 2.0).abs() < 0.2);
        }
    }

    #[test]
    fn test_flat_region_is_lost() {
        let img = GrayImage::new(64, 64);
        let tracker = PointTracker::new();
        let out = tracker.track(&img, &img, &[[32.0, 32.0]]);
        assert!(out[0].lost);
    }
}
