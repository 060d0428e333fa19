//! VidStab Pipeline - Stabilization jobs
//!
//! This crate ties the stages together:
//! - Job configuration (StabilizeConfig)
//! - Cancellation and per-frame progress
//! - Two-pass orchestration (Stabilizer)
//! - Registry of running jobs
//! - Output file naming

pub mod config;
pub mod job;
pub mod naming;
pub mod progress;
pub mod registry;

pub use config::StabilizeConfig;
pub use job::{Analysis, JobOutcome, JobReport, PartialOutput, RenderPlan, Stabilizer};
pub use naming::unique_output_path;
pub use progress::{CancelToken, JobProgress, Pass, ProgressCallback};
pub use registry::{JobLease, JobRegistry};

use std::path::Path;
use vidstab_core::Result;
use vidstab_media::{FrameSource, ImageSequenceSource, VideoFileSource};

/// Open `path` as a frame source: a directory is an image sequence, anything
/// else a video file.
pub fn open_source(path: &Path, config: &StabilizeConfig) -> Result<Box<dyn FrameSource>> {
    if path.is_dir() {
        let source = ImageSequenceSource::from_dir(path, config.fixed_resolution)?;
        let source = match config.output_frame_rate {
            Some(rate) => source.with_frame_rate(rate),
            None => source,
        };
        Ok(Box::new(source))
    } else {
        Ok(Box::new(VideoFileSource::open(path)?))
    }
}
