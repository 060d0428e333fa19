//! Frame-to-frame camera motion estimation.

use glam::DVec2;
use tracing::debug;
use vidstab_core::MotionSample;

use crate::features::{good_features_to_track, CornerParams, TrackingMask};
use crate::point_tracker::PointTracker;
use crate::pyramid::{GrayImage, ImagePyramid};
use crate::similarity::{estimate_partial_similarity, RansacParams};

/// Fewer matched pairs than this cannot constrain a similarity.
pub const MIN_MATCHED_POINTS: usize = 2;

/// Hold-last policy for frames where no motion could be estimated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EstimatorState {
    /// No good estimate yet, degenerate frames yield the zero sample.
    #[default]
    Fresh,
    /// Degenerate frames repeat this sample.
    Holding(MotionSample),
}

impl EstimatorState {
    pub fn fallback(self) -> MotionSample {
        match self {
            Self::Fresh => MotionSample::ZERO,
            Self::Holding(sample) => sample,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Degenerate {
    TooFewPoints(usize),
    NoModel,
}

/// Estimates the similarity motion between consecutive grayscale frames.
#[derive(Debug, Clone, Default)]
pub struct MotionEstimator {
    pub corners: CornerParams,
    pub tracker: PointTracker,
    pub ransac: RansacParams,
    state: EstimatorState,
}

impl MotionEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// Forget the held sample, e.g. before a new analysis pass.
    pub fn reset(&mut self) {
        self.state = EstimatorState::Fresh;
    }

    /// Corner positions to track out of `gray`.
    pub fn detect(&self, gray: &GrayImage, mask: Option<&TrackingMask>) -> Vec<[f32; 2]> {
        good_features_to_track(gray, &self.corners, mask)
            .into_iter()
            .map(|c| [c.x, c.y])
            .collect()
    }

    /// Motion from `prev_gray` to `curr_gray`.
    pub fn estimate(
        &mut self,
        prev_gray: &GrayImage,
        curr_gray: &GrayImage,
        mask: Option<&TrackingMask>,
    ) -> MotionSample {
        let points = self.detect(prev_gray, mask);
        let prev_pyr = self.tracker.build_pyramid(prev_gray);
        let curr_pyr = self.tracker.build_pyramid(curr_gray);
        self.estimate_points(&prev_pyr, &points, &curr_pyr)
    }

    /// Motion of already detected `points` from `prev_pyr` into `curr_pyr`.
    pub fn estimate_points(
        &mut self,
        prev_pyr: &ImagePyramid,
        points: &[[f32; 2]],
        curr_pyr: &ImagePyramid,
    ) -> MotionSample {
        match self.fit(prev_pyr, points, curr_pyr) {
            Ok(sample) => {
                self.state = EstimatorState::Holding(sample);
                sample
            }
            Err(reason) => {
                let held = self.state.fallback();
                debug!(?reason, ?held, "motion estimation degenerate, holding last sample");
                held
            }
        }
    }

    fn fit(
        &self,
        prev_pyr: &ImagePyramid,
        points: &[[f32; 2]],
        curr_pyr: &ImagePyramid,
    ) -> Result<MotionSample, Degenerate> {
        if points.len() < MIN_MATCHED_POINTS {
            return Err(Degenerate::TooFewPoints(points.len()));
        }
        let tracked = self.tracker.track_pyramids(prev_pyr, curr_pyr, points);
        let (src, dst): (Vec<DVec2>, Vec<DVec2>) = tracked
            .iter()
            .filter(|p| !p.lost)
            .map(|p| {
                (
                    DVec2::new(p.origin[0] as f64, p.origin[1] as f64),
                    DVec2::new(p.position[0] as f64, p.position[1] as f64),
                )
            })
            .unzip();
        if src.len() < MIN_MATCHED_POINTS {
            return Err(Degenerate::TooFewPoints(src.len()));
        }
        let fit = estimate_partial_similarity(&src, &dst, &self.ransac).ok_or(Degenerate::NoModel)?;
        debug!(
            detected = points.len(),
            matched = src.len(),
            inliers = fit.inliers,
            "motion estimated"
        );
        Ok(MotionSample::from_affine(&fit.transform))
    }
}
