//! VidStab Tracking - Motion estimation, path smoothing and frame correction.

pub mod crop;
pub mod features;
pub mod motion;
pub mod point_tracker;
pub mod pyramid;
pub mod similarity;
pub mod smoothing;
pub mod trajectory;
pub mod warp;

pub use crop::{estimate_crop, needs_zoom, CropMode, AUTO_CROP_MARGIN, MIN_CROP};
pub use features::{good_features_to_track, Corner, CornerParams, TrackingMask};
pub use motion::{EstimatorState, MotionEstimator};
pub use point_tracker::{PointTracker, TrackPoint};
pub use pyramid::{compute_gradients, rgb_to_gray, GrayImage, ImagePyramid};
pub use similarity::{estimate_partial_similarity, RansacParams, SimilarityFit};
pub use smoothing::{delta, distribute, moving_average, smooth, window_size, SmoothingAlgorithm};
pub use trajectory::{Trajectory, TrajectoryBuilder, TrajectoryMode};
pub use warp::FrameWarper;
