//! Motion estimation fallbacks and short reads.

use vidstab_core::{FrameBuffer, FrameRate, MotionSample, Result};
use vidstab_media::{FrameSource, FrameVisitor};
use vidstab_pipeline::{Stabilizer, StabilizeConfig};
use vidstab_tracking::{EstimatorState, GrayImage, MotionEstimator};

use crate::synthetic::{panning_frames, texture, HEIGHT, WIDTH};

fn gray(shift_x: f32) -> GrayImage {
    GrayImage::from_fn(WIDTH, HEIGHT, |x, y| texture(x as f32 - shift_x, y as f32))
}

#[test]
fn featureless_pair_holds_the_last_sample() {
    let mut estimator = MotionEstimator::new();
    let good = estimator.estimate(&gray(0.0), &gray(3.0), None);
    assert!((good.dx - 3.0).abs() < 0.25);

    let flat = GrayImage::new(WIDTH, HEIGHT);
    let held = estimator.estimate(&flat, &flat, None);
    assert_eq!(held, good);
    assert_ne!(held, MotionSample::ZERO);
    assert_eq!(estimator.state(), EstimatorState::Holding(good));
}

#[test]
fn corners_lost_while_tracking_hold_the_last_sample() {
    let mut estimator = MotionEstimator::new();
    let good = estimator.estimate(&gray(0.0), &gray(2.0), None);
    assert!((good.dx - 2.0).abs() < 0.25);

    // no window passes the eigenvalue test, so corners are found but none survive
    estimator.tracker.min_eigen_threshold = f32::MAX;
    assert!(!estimator.detect(&gray(0.0), None).is_empty());
    let held = estimator.estimate(&gray(0.0), &gray(5.0), None);
    assert_eq!(held, good);
    assert_eq!(estimator.state(), EstimatorState::Holding(good));
}

/// Claims more frames than it can deliver, like a truncated file.
struct TruncatedSource {
    frames: Vec<FrameBuffer>,
    claimed: usize,
}

impl FrameSource for TruncatedSource {
    fn name(&self) -> &str {
        "truncated"
    }

    fn width(&self) -> u32 {
        WIDTH
    }

    fn height(&self) -> u32 {
        HEIGHT
    }

    fn frame_rate(&self) -> FrameRate {
        FrameRate::FPS_30
    }

    fn frame_count(&self) -> usize {
        self.claimed
    }

    fn for_each_frame(&mut self, visitor: &mut FrameVisitor<'_>) -> Result<()> {
        for (i, frame) in self.frames.iter().enumerate() {
            if !visitor(i, self.claimed, frame) {
                break;
            }
        }
        Ok(())
    }
}

#[test]
fn short_read_truncates_the_trajectory() {
    let mut source = TruncatedSource {
        frames: panning_frames(6, 1.0),
        claimed: 10,
    };
    let stabilizer = Stabilizer::new(StabilizeConfig::default()).unwrap();
    let analysis = stabilizer.analyze(&mut source).unwrap().unwrap();
    assert_eq!(analysis.trajectory.len(), 6);
    assert_eq!(analysis.properties.frame_count(), 6);
    assert_eq!(stabilizer.plan(&analysis).corrections.len(), 6);
}
