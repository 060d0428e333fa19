//! Robust partial similarity (rotation, uniform scale, translation) estimation.

use glam::{DAffine2, DMat2, DVec2};
use serde::{Deserialize, Serialize};

/// RANSAC parameters for [`estimate_partial_similarity`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RansacParams {
    /// Maximum reprojection error of an inlier, in pixels.
    pub threshold: f64,
    pub max_iterations: u32,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            max_iterations: 2000,
            confidence: 0.99,
            seed: 12345,
        }
    }
}

/// Fitted model together with its support.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityFit {
    pub transform: DAffine2,
    pub inliers: usize,
}

/// `[[a, -b, tx], [b, a, ty]]`
fn similarity(a: f64, b: f64, t: DVec2) -> DAffine2 {
    DAffine2::from_mat2_translation(DMat2::from_cols(DVec2::new(a, b), DVec2::new(-b, a)), t)
}

/// Exact similarity mapping two source points onto two destination points.
pub fn similarity_from_two(src: [DVec2; 2], dst: [DVec2; 2]) -> Option<DAffine2> {
    let ds = src[1] - src[0];
    let dd = dst[1] - dst[0];
    let len2 = ds.length_squared();
    if len2 < 1e-12 {
        return None;
    }
    // complex division dd / ds
    let a = (dd.x * ds.x + dd.y * ds.y) / len2;
    let b = (dd.y * ds.x - dd.x * ds.y) / len2;
    let rotated = DVec2::new(a * src[0].x - b * src[0].y, b * src[0].x + a * src[0].y);
    Some(similarity(a, b, dst[0] - rotated))
}

/// Closed-form least-squares similarity over all pairs.
pub fn similarity_least_squares(src: &[DVec2], dst: &[DVec2]) -> Option<DAffine2> {
    let n = src.len().min(dst.len());
    if n < 2 {
        return None;
    }
    let inv_n = 1.0 / n as f64;
    let src_mean = src[..n].iter().copied().sum::<DVec2>() * inv_n;
    let dst_mean = dst[..n].iter().copied().sum::<DVec2>() * inv_n;

    let mut norm = 0.0;
    let mut sa = 0.0;
    let mut sb = 0.0;
    for (s, d) in src[..n].iter().zip(&dst[..n]) {
        let p = *s - src_mean;
        let q = *d - dst_mean;
        norm += p.length_squared();
        sa += p.x * q.x + p.y * q.y;
        sb += p.x * q.y - p.y * q.x;
    }
    if norm < 1e-12 {
        return None;
    }
    let a = sa / norm;
    let b = sb / norm;
    let rotated = DVec2::new(
        a * src_mean.x - b * src_mean.y,
        b * src_mean.x + a * src_mean.y,
    );
    let transform = similarity(a, b, dst_mean - rotated);
    transform.is_finite().then_some(transform)
}

fn count_inliers(model: &DAffine2, src: &[DVec2], dst: &[DVec2], threshold2: f64) -> usize {
    src.iter()
        .zip(dst)
        .filter(|(s, d)| (model.transform_point2(**s) - **d).length_squared() <= threshold2)
        .count()
}

/// Number of iterations needed to draw one all-inlier pair with `confidence`.
fn adaptive_iterations(confidence: f64, inlier_ratio: f64, max_iterations: u32) -> u32 {
    let good = inlier_ratio * inlier_ratio;
    if good >= 1.0 {
        return 1;
    }
    if good <= 0.0 {
        return max_iterations;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - good).ln();
    if !needed.is_finite() {
        return max_iterations;
    }
    (needed.ceil().max(1.0) as u32).min(max_iterations)
}

/// RANSAC over two-point samples, then a least-squares refit on the inliers.
///
/// Returns `None` when fewer than two pairs are given or no non-degenerate
/// model exists. Sampling is deterministic for a given seed.
pub fn estimate_partial_similarity(
    src: &[DVec2],
    dst: &[DVec2],
    params: &RansacParams,
) -> Option<SimilarityFit> {
    let n = src.len().min(dst.len());
    if n < 2 {
        return None;
    }
    let src = &src[..n];
    let dst = &dst[..n];
    let threshold2 = params.threshold * params.threshold;

    let mut best: Option<(DAffine2, usize)> = None;
    let mut seed = params.seed;
    let next_index = |seed: &mut u64| {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        (*seed >> 33) as usize % n
    };

    let mut iterations = params.max_iterations.max(1);
    let mut iter = 0;
    while iter < iterations {
        iter += 1;
        let i = next_index(&mut seed);
        let mut j = next_index(&mut seed);
        if i == j {
            j = (j + 1) % n;
        }
        let Some(model) = similarity_from_two([src[i], src[j]], [dst[i], dst[j]]) else {
            continue;
        };
        let inliers = count_inliers(&model, src, dst, threshold2);
        if best.map_or(true, |(_, b)| inliers > b) {
            best = Some((model, inliers));
            iterations = iterations.min(adaptive_iterations(
                params.confidence,
                inliers as f64 / n as f64,
                params.max_iterations.max(1),
            ));
        }
    }

    let (model, _) = best?;
    let (in_src, in_dst): (Vec<DVec2>, Vec<DVec2>) = src
        .iter()
        .zip(dst)
        .filter(|(s, d)| (model.transform_point2(**s) - **d).length_squared() <= threshold2)
        .map(|(s, d)| (*s, *d))
        .unzip();

    let refined = similarity_least_squares(&in_src, &in_dst).unwrap_or(model);
    let inliers = count_inliers(&refined, src, dst, threshold2);
    Some(SimilarityFit {
        transform: refined,
        inliers,
    })
}
