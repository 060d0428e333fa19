//! VidStab Core - Foundation types for video stabilization
//!
//! This crate provides the fundamental types shared by every stage:
//! - Error taxonomy (VidstabError, Result)
//! - Frame buffers and pixel formats
//! - Frame rates and presentation timestamps
//! - Motion samples, corrective transforms and affine helpers
//! - Immutable video properties captured during analysis

pub mod error;
pub mod frame;
pub mod geometry;
pub mod time;
pub mod video;

pub use error::{Result, VidstabError};
pub use frame::{FrameBuffer, PixelFormat};
pub use geometry::{center_zoom, normalize_angle, CorrectiveTransform, MotionSample};
pub use time::{FrameRate, MICROS_PER_SECOND};
pub use video::VideoProperties;
