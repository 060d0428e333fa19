//! Two-pass stabilization job.
//!
//! Pass 1 walks the source read-only and records the camera trajectory.
//! Planning smooths it and picks the crop. Pass 2 walks the source again,
//! corrects every frame and encodes it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use vidstab_core::{CorrectiveTransform, FrameRate, Result, VideoProperties, VidstabError};
use vidstab_media::{
    merge_tracks, EncoderProvider, EncoderSettings, FfmpegEncoderProvider, FrameSource, WorkDir,
};
use vidstab_tracking::{
    estimate_crop, needs_zoom, smooth, window_size, FrameWarper, SmoothingAlgorithm, Trajectory,
    TrajectoryBuilder,
};

use crate::config::StabilizeConfig;
use crate::progress::{CancelToken, JobProgress, Pass, ProgressCallback};
use crate::registry::JobRegistry;

/// Result of pass 1.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub properties: VideoProperties,
    pub trajectory: Trajectory,
    pub algorithm: SmoothingAlgorithm,
}

/// Everything pass 2 needs besides the frames.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub corrections: Vec<CorrectiveTransform>,
    pub crop: f64,
    pub output_rate: FrameRate,
    /// Moving average half-width in frames.
    pub window: usize,
}

/// Summary of a finished job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub output: PathBuf,
    pub properties: VideoProperties,
    pub frames_written: usize,
    pub crop: f64,
    pub audio_merged: bool,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(JobReport),
    Cancelled,
}

impl JobOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Output file that is deleted on drop unless committed.
#[derive(Debug)]
pub struct PartialOutput {
    path: PathBuf,
    committed: bool,
}

impl PartialOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            committed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file.
    pub fn commit(mut self) -> PathBuf {
        self.committed = true;
        self.path.clone()
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.committed || !self.path.exists() {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed partial output {}", self.path.display()),
            Err(e) => warn!("could not remove {}: {e}", self.path.display()),
        }
    }
}

/// Hidden sibling of `output` that pass 2 encodes into.
fn staging_path(output: &Path) -> Result<PathBuf> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("render");
    Ok(WorkDir::at(dir)?.temp_file(&format!(".{stem}"), "part.mp4"))
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // rename fails across file systems
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)?;
    Ok(())
}

/// Job context: configuration, cancellation and progress of one job.
pub struct Stabilizer {
    config: StabilizeConfig,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
    encoders: Arc<dyn EncoderProvider>,
    registry: JobRegistry,
    work_dir: Option<WorkDir>,
    warper: FrameWarper,
}

impl Stabilizer {
    pub fn new(config: StabilizeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
            progress: None,
            encoders: Arc::new(FfmpegEncoderProvider),
            registry: JobRegistry::new(),
            work_dir: None,
            warper: FrameWarper::new(),
        })
    }

    pub fn with_encoder_provider(mut self, encoders: Arc<dyn EncoderProvider>) -> Self {
        self.encoders = encoders;
        self
    }

    /// Share a registry with other jobs of the process.
    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_progress(mut self, callback: impl Fn(JobProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_work_dir(mut self, work_dir: WorkDir) -> Self {
        self.work_dir = Some(work_dir);
        self
    }

    pub fn config(&self) -> &StabilizeConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn report(&self, pass: Pass, frame_index: usize, total_frames: usize) {
        if let Some(callback) = &self.progress {
            callback(JobProgress {
                pass,
                frame_index,
                total_frames,
            });
        }
    }

    /// Pass 1. `None` when cancelled.
    pub fn analyze(&self, source: &mut dyn FrameSource) -> Result<Option<Analysis>> {
        let algorithm = self.config.algorithm;
        let mut builder = TrajectoryBuilder::new(algorithm.trajectory_mode(), self.config.load_mask()?);
        let (width, height) = (source.width(), source.height());
        let expected = source.frame_count();
        info!(
            "Analyzing {} ({}x{}, {} frames, {})",
            source.name(),
            width,
            height,
            expected,
            algorithm
        );

        let mut cancelled = false;
        let mut mismatch = None;
        source.for_each_frame(&mut |index, total, frame| {
            if self.cancel.is_cancelled() {
                cancelled = true;
                return false;
            }
            if frame.width != width || frame.height != height {
                mismatch = Some((index, frame.width, frame.height));
                return false;
            }
            let sample = builder.push_frame(frame);
            debug!(index, dx = sample.dx, dy = sample.dy, da = sample.da, "motion sample");
            self.report(Pass::Analyze, index, total);
            true
        })?;

        if cancelled {
            info!("Analysis cancelled after {} frames", builder.len());
            return Ok(None);
        }
        if let Some((index, w, h)) = mismatch {
            return Err(VidstabError::SourceUnavailable(format!(
                "frame {index} is {w}x{h}, expected {width}x{height}"
            )));
        }

        let trajectory = builder.finish();
        if trajectory.is_empty() {
            return Err(VidstabError::SourceUnavailable(format!(
                "no frames could be read from {}",
                source.name()
            )));
        }
        if expected > 0 && trajectory.len() < expected {
            info!("Source ended after {} of {} frames", trajectory.len(), expected);
        }

        let properties = VideoProperties::new(
            width,
            height,
            source.frame_rate(),
            source.rotation_degrees(),
            trajectory.len(),
        );
        Ok(Some(Analysis {
            properties,
            trajectory,
            algorithm,
        }))
    }

    /// Smooth the trajectory and choose the crop.
    pub fn plan(&self, analysis: &Analysis) -> RenderPlan {
        let props = &analysis.properties;
        let output_rate = self.config.output_rate(props.frame_rate());
        let window = window_size(output_rate, self.config.strength);
        let corrections = smooth(&analysis.trajectory, analysis.algorithm, window);
        let crop = estimate_crop(&corrections, props.width(), props.height(), self.config.crop);
        info!(
            "Planned {} corrections, window {} frames, crop {:.4}{}",
            corrections.len(),
            window,
            crop,
            if needs_zoom(crop) { "" } else { " (no zoom)" }
        );
        RenderPlan {
            corrections,
            crop,
            output_rate,
            window,
        }
    }

    /// Pass 2 into `output`. Returns the frames written, `None` when
    /// cancelled. Frames go to a staging file that replaces `output` only
    /// once the encoder closed cleanly; on any other exit `output` is
    /// left untouched.
    pub fn render(
        &self,
        source: &mut dyn FrameSource,
        analysis: &Analysis,
        plan: &RenderPlan,
        output: &Path,
    ) -> Result<Option<usize>> {
        let props = &analysis.properties;
        let guard = PartialOutput::new(staging_path(output)?);
        let settings = EncoderSettings::new(
            guard.path(),
            props.width(),
            props.height(),
            plan.output_rate,
            self.config.codec,
        );
        let mut encoder = self.encoders.create(settings)?;

        let total = plan.corrections.len();
        let mut written = 0usize;
        let mut cancelled = false;
        let mut failure = None;
        let walk = source.for_each_frame(&mut |index, _, frame| {
            if index >= total {
                return false;
            }
            if self.cancel.is_cancelled() {
                cancelled = true;
                return false;
            }
            let corrected = self.warper.render(frame, plan.corrections[index], plan.crop);
            if let Err(e) = encoder.write(&corrected) {
                failure = Some(e);
                return false;
            }
            written += 1;
            self.report(Pass::Render, index, total);
            true
        });

        if let Err(e) = walk {
            encoder.abort();
            return Err(e);
        }
        if let Some(e) = failure {
            encoder.abort();
            return Err(e);
        }
        if cancelled {
            encoder.abort();
            info!("Render cancelled after {} frames", written);
            return Ok(None);
        }

        encoder.release()?;
        if guard.path().exists() {
            move_file(guard.path(), output)?;
        } else {
            debug!("encoder kept no file at {}", guard.path().display());
        }
        guard.commit();
        info!("Rendered {} frames to {}", written, output.display());
        Ok(Some(written))
    }

    /// Run both passes from `source` (read from `source_path`) into `output`.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        source_path: &Path,
        output: &Path,
    ) -> Result<JobOutcome> {
        let _lease = self.registry.acquire(source_path, output)?;
        let started = Instant::now();

        let Some(analysis) = self.analyze(source)? else {
            return Ok(JobOutcome::Cancelled);
        };
        let plan = self.plan(&analysis);
        if self.cancel.is_cancelled() {
            return Ok(JobOutcome::Cancelled);
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let merge_audio = self.config.keep_audio && source_path.is_file();
        let target = if merge_audio {
            let work_dir = match &self.work_dir {
                Some(dir) => dir.clone(),
                None => WorkDir::open()?,
            };
            work_dir.temp_file("stab", "mp4")
        } else {
            output.to_path_buf()
        };

        let Some(frames_written) = self.render(source, &analysis, &plan, &target)? else {
            return Ok(JobOutcome::Cancelled);
        };

        let audio_merged = if merge_audio {
            self.attach_audio(&target, source_path, output)?
        } else {
            false
        };

        let report = JobReport {
            output: output.to_path_buf(),
            properties: analysis.properties,
            frames_written,
            crop: plan.crop,
            audio_merged,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            "Stabilized {} frames into {} in {:.1}s",
            report.frames_written,
            report.output.display(),
            report.elapsed_secs
        );
        Ok(JobOutcome::Completed(report))
    }

    /// Merge the audio of `original` with the render. A failed merge keeps
    /// the video-only render as the output.
    fn attach_audio(&self, render: &Path, original: &Path, output: &Path) -> Result<bool> {
        let _render = PartialOutput::new(render);
        match merge_tracks(output, render, original) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("Audio merge failed, keeping video only: {e}");
                move_file(render, output)?;
                Ok(false)
            }
        }
    }
}
