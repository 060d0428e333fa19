//! Job configuration.
//!
//! Stored as JSON; every field is optional in the file and falls back to the
//! defaults of [`StabilizeConfig::default`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use vidstab_core::{FrameRate, Result, VidstabError};
use vidstab_media::VideoCodec;
use vidstab_tracking::{CropMode, SmoothingAlgorithm, TrackingMask};

/// Settings of one stabilization job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizeConfig {
    pub algorithm: SmoothingAlgorithm,
    /// Widens the smoothing window by one second per step.
    pub strength: u32,
    pub crop: CropMode,
    /// Output rate; the source rate when absent.
    pub output_frame_rate: Option<FrameRate>,
    pub codec: VideoCodec,
    /// Image whose non-black pixels mark regions to ignore while tracking.
    pub mask: Option<PathBuf>,
    /// Output size of image sequences.
    pub fixed_resolution: Option<(u32, u32)>,
    /// Copy the audio of the original into the output.
    pub keep_audio: bool,
}

impl Default for StabilizeConfig {
    fn default() -> Self {
        Self {
            algorithm: SmoothingAlgorithm::default(),
            strength: 1,
            crop: CropMode::Auto,
            output_frame_rate: None,
            codec: VideoCodec::default(),
            mask: None,
            fixed_resolution: None,
            keep_audio: false,
        }
    }
}

impl StabilizeConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(rate) = self.output_frame_rate {
            if !rate.is_valid() {
                return Err(VidstabError::InvalidParameter(format!(
                    "output frame rate {}/{} is not valid",
                    rate.numerator, rate.denominator
                )));
            }
        }
        if let CropMode::Fixed(ratio) = self.crop {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(VidstabError::InvalidParameter(format!(
                    "crop ratio must be a non-negative number, got {ratio}"
                )));
            }
        }
        if let Some((w, h)) = self.fixed_resolution {
            if w == 0 || h == 0 {
                return Err(VidstabError::InvalidParameter(format!(
                    "fixed resolution {w}x{h} is empty"
                )));
            }
        }
        Ok(())
    }

    /// Output frame rate for a source running at `source_rate`.
    pub fn output_rate(&self, source_rate: FrameRate) -> FrameRate {
        self.output_frame_rate.unwrap_or(source_rate)
    }

    /// Serialize to pretty JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| VidstabError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)
            .map_err(|e| VidstabError::Serialization(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        debug!(path = %path.display(), "loading config");
        Self::from_json(&data)
    }

    /// Decode the configured mask image, if any.
    pub fn load_mask(&self) -> Result<Option<TrackingMask>> {
        let Some(path) = &self.mask else {
            return Ok(None);
        };
        let luma = image::open(path)
            .map_err(|e| VidstabError::Image(format!("{}: {e}", path.display())))?
            .into_luma8();
        let (w, h) = luma.dimensions();
        TrackingMask::from_luma(w, h, luma.as_raw())
            .map(Some)
            .ok_or_else(|| {
                VidstabError::InvalidParameter(format!("mask {} is empty", path.display()))
            })
    }
}
