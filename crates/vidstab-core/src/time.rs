//! Frame rates and presentation timestamps.
//!
//! Uses rational numbers so that timestamps of NTSC-style rates
//! (30000/1001 and friends) stay exact over long encodes.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VidstabError;

/// Microseconds per second, the timestamp unit of the encoder.
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 24000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Integral frame rate.
    #[inline]
    pub const fn from_fps(fps: u32) -> Self {
        Self::new(fps, 1)
    }

    /// Both terms are non-zero.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Frames per second rounded to the nearest integer, at least 1.
    ///
    /// The smoothing window is expressed in whole frames per second.
    pub fn rounded_fps(self) -> u32 {
        if !self.is_valid() {
            return 1;
        }
        (self.to_fps_f64().round() as u32).max(1)
    }

    /// Presentation timestamp of a frame in microseconds:
    /// `index * 1_000_000 / fps`, floored.
    pub fn frame_to_micros(self, index: u64) -> i64 {
        if !self.is_valid() {
            return 0;
        }
        let pts = Rational64::new(
            index as i64 * MICROS_PER_SECOND * self.denominator as i64,
            self.numerator as i64,
        );
        pts.floor().to_integer()
    }

    /// Parse ffprobe-style rates: `"30000/1001"`, `"30/1"` or `"29.97"`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some((num, den)) = s.split_once('/') {
            let num: u32 = num.trim().parse().ok()?;
            let den: u32 = den.trim().parse().ok()?;
            let rate = Self::new(num, den);
            return rate.is_valid().then_some(rate);
        }
        let fps: f64 = s.parse().ok()?;
        if !fps.is_finite() || fps <= 0.0 {
            return None;
        }
        if (fps - fps.round()).abs() < 1e-6 {
            return Some(Self::from_fps(fps.round() as u32));
        }
        Some(Self::new((fps * 1000.0).round() as u32, 1000))
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_59_94: Self = Self::new(60000, 1001);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

impl FromStr for FrameRate {
    type Err = VidstabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| VidstabError::InvalidParameter(format!("invalid frame rate '{s}'")))
    }
}
