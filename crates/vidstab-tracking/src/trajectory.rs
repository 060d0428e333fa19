//! Accumulated camera path over the analyzed frames.

use serde::{Deserialize, Serialize};
use tracing::trace;
use vidstab_core::{FrameBuffer, MotionSample};

use crate::features::TrackingMask;
use crate::motion::MotionEstimator;
use crate::pyramid::{rgb_to_gray, GrayImage, ImagePyramid};

/// Per-frame camera position: x, y and angle, always of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    x: Vec<f64>,
    y: Vec<f64>,
    a: Vec<f64>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f64, y: f64, a: f64) {
        self.x.push(x);
        self.y.push(y);
        self.a.push(a);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Position at `index` as `(x, y, a)`.
    pub fn get(&self, index: usize) -> Option<(f64, f64, f64)> {
        Some((*self.x.get(index)?, *self.y.get(index)?, *self.a.get(index)?))
    }
}

/// How positions are derived from motion samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrajectoryMode {
    /// `t[i] = t[i-1] + motion(i-1 -> i)`
    #[default]
    Cumulative,
    /// `t[i] = -motion(0 -> i)`, corners are detected once on frame 0.
    Anchored,
}

enum BuilderState {
    Empty,
    Cumulative {
        prev: GrayImage,
        prev_pyr: ImagePyramid,
        position: (f64, f64, f64),
    },
    Anchored {
        anchor_pyr: ImagePyramid,
        anchor_points: Vec<[f32; 2]>,
    },
}

/// Consumes frames in order and records the camera path.
pub struct TrajectoryBuilder {
    mode: TrajectoryMode,
    estimator: MotionEstimator,
    mask: Option<TrackingMask>,
    state: BuilderState,
    trajectory: Trajectory,
}

impl TrajectoryBuilder {
    pub fn new(mode: TrajectoryMode, mask: Option<TrackingMask>) -> Self {
        Self::with_estimator(mode, mask, MotionEstimator::new())
    }

    pub fn with_estimator(
        mode: TrajectoryMode,
        mask: Option<TrackingMask>,
        estimator: MotionEstimator,
    ) -> Self {
        Self {
            mode,
            estimator,
            mask,
            state: BuilderState::Empty,
            trajectory: Trajectory::new(),
        }
    }

    pub fn mode(&self) -> TrajectoryMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    pub fn push_frame(&mut self, frame: &FrameBuffer) -> MotionSample {
        self.push_gray(rgb_to_gray(frame))
    }

    /// Append the next frame, returning the motion sample it contributed
    /// (zero for the first frame).
    pub fn push_gray(&mut self, gray: GrayImage) -> MotionSample {
        let pyr = self.estimator.tracker.build_pyramid(&gray);
        let state = std::mem::replace(&mut self.state, BuilderState::Empty);

        let (sample, next) = match (state, self.mode) {
            (BuilderState::Empty, TrajectoryMode::Cumulative) => {
                self.trajectory.push(0.0, 0.0, 0.0);
                (
                    MotionSample::ZERO,
                    BuilderState::Cumulative {
                        prev: gray,
                        prev_pyr: pyr,
                        position: (0.0, 0.0, 0.0),
                    },
                )
            }
            (BuilderState::Empty, TrajectoryMode::Anchored) => {
                let anchor_points = self.estimator.detect(&gray, self.mask.as_ref());
                self.trajectory.push(0.0, 0.0, 0.0);
                (
                    MotionSample::ZERO,
                    BuilderState::Anchored {
                        anchor_pyr: pyr,
                        anchor_points,
                    },
                )
            }
            (
                BuilderState::Cumulative {
                    prev,
                    prev_pyr,
                    position,
                },
                _,
            ) => {
                let points = self.estimator.detect(&prev, self.mask.as_ref());
                let sample = self.estimator.estimate_points(&prev_pyr, &points, &pyr);
                let position = (
                    position.0 + sample.dx,
                    position.1 + sample.dy,
                    position.2 + sample.da,
                );
                self.trajectory.push(position.0, position.1, position.2);
                (
                    sample,
                    BuilderState::Cumulative {
                        prev: gray,
                        prev_pyr: pyr,
                        position,
                    },
                )
            }
            (
                BuilderState::Anchored {
                    anchor_pyr,
                    anchor_points,
                },
                _,
            ) => {
                let sample = self
                    .estimator
                    .estimate_points(&anchor_pyr, &anchor_points, &pyr);
                let offset = -sample;
                self.trajectory.push(offset.dx, offset.dy, offset.da);
                (
                    sample,
                    BuilderState::Anchored {
                        anchor_pyr,
                        anchor_points,
                    },
                )
            }
        };

        trace!(index = self.trajectory.len() - 1, ?sample, "frame analyzed");
        self.state = next;
        sample
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn finish(self) -> Trajectory {
        self.trajectory
    }
}
