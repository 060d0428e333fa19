//! Immutable description of the analyzed video.

use serde::{Deserialize, Serialize};

use crate::time::FrameRate;

/// Properties captured once during analysis and never mutated afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoProperties {
    width: u32,
    height: u32,
    frame_rate: FrameRate,
    rotation_degrees: i32,
    frame_count: usize,
}

impl VideoProperties {
    pub fn new(
        width: u32,
        height: u32,
        frame_rate: FrameRate,
        rotation_degrees: i32,
        frame_count: usize,
    ) -> Self {
        Self {
            width,
            height,
            frame_rate,
            rotation_degrees,
            frame_count,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    /// Rotation tag of the source container, frames are delivered upright.
    pub fn rotation_degrees(&self) -> i32 {
        self.rotation_degrees
    }

    /// Frames actually analyzed.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}
