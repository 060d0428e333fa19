//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use vidstab_core::FrameRate;
use vidstab_media::VideoCodec;
use vidstab_pipeline::{
    open_source, unique_output_path, JobOutcome, JobProgress, Stabilizer, StabilizeConfig,
};
use vidstab_tracking::{CropMode, SmoothingAlgorithm};

use crate::JobArgs;

fn parse_crop(value: &str) -> Result<CropMode> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(CropMode::Auto);
    }
    let ratio: f64 = value
        .parse()
        .with_context(|| format!("crop must be 'auto' or a number, got '{value}'"))?;
    Ok(CropMode::Fixed(ratio))
}

fn parse_resolution(value: &str) -> Result<(u32, u32)> {
    let Some((w, h)) = value.split_once(['x', 'X']) else {
        bail!("resolution must look like 1920x1080, got '{value}'");
    };
    Ok((
        w.trim().parse().context("invalid width")?,
        h.trim().parse().context("invalid height")?,
    ))
}

/// Config file first, then command-line overrides.
pub fn build_config(args: &JobArgs) -> Result<StabilizeConfig> {
    let mut config = match &args.config {
        Some(path) => StabilizeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StabilizeConfig::default(),
    };
    if let Some(algorithm) = &args.algorithm {
        config.algorithm = algorithm.parse::<SmoothingAlgorithm>()?;
    }
    if let Some(strength) = args.strength {
        config.strength = strength;
    }
    if let Some(crop) = &args.crop {
        config.crop = parse_crop(crop)?;
    }
    if let Some(fps) = &args.fps {
        config.output_frame_rate = Some(fps.parse::<FrameRate>()?);
    }
    if let Some(codec) = &args.codec {
        config.codec = codec.parse::<VideoCodec>()?;
    }
    if let Some(mask) = &args.mask {
        config.mask = Some(mask.clone());
    }
    if let Some(resolution) = &args.resolution {
        config.fixed_resolution = Some(parse_resolution(resolution)?);
    }
    if args.keep_audio {
        config.keep_audio = true;
    }
    config.validate()?;
    Ok(config)
}

fn print_progress(p: JobProgress) {
    let mut err = std::io::stderr();
    let _ = write!(
        err,
        "\r{:>7} {:>6} / {:<6} {:5.1}%",
        p.pass,
        p.frame_index + 1,
        p.total_frames,
        p.fraction() * 100.0
    );
    let _ = err.flush();
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |m, v| m.max(v.abs()))
}

pub fn analyze(input: &Path, json: bool, args: &JobArgs) -> Result<()> {
    let config = build_config(args)?;
    let mut source = open_source(input, &config)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let job = Stabilizer::new(config)?;

    let Some(analysis) = job.analyze(source.as_mut())? else {
        bail!("analysis was cancelled");
    };
    eprintln!();

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis.trajectory)?);
        return Ok(());
    }

    let props = &analysis.properties;
    let plan = job.plan(&analysis);
    let t = &analysis.trajectory;
    println!("Source:      {}", input.display());
    println!("Size:        {}x{}", props.width(), props.height());
    println!("Frame rate:  {}", props.frame_rate());
    println!("Rotation:    {}°", props.rotation_degrees());
    println!("Frames:      {}", props.frame_count());
    println!("Algorithm:   {}", analysis.algorithm);
    println!("Max |x|:     {:.2} px", max_abs(t.x()));
    println!("Max |y|:     {:.2} px", max_abs(t.y()));
    println!("Max |angle|: {:.4} rad", max_abs(t.a()));
    println!("Window:      {} frames", plan.window);
    println!("Crop:        {:.4}", plan.crop);
    Ok(())
}

pub fn stabilize(
    input: &Path,
    output: Option<PathBuf>,
    output_dir: &Path,
    args: &JobArgs,
) -> Result<()> {
    let config = build_config(args)?;
    let mut source = open_source(input, &config)
        .with_context(|| format!("Failed to open {}", input.display()))?;

    let output = match output {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;
            unique_output_path(output_dir, source.name())?
        }
    };

    let job = Stabilizer::new(config)?.with_progress(print_progress);
    let outcome = job.run(source.as_mut(), input, &output);
    eprintln!();

    match outcome? {
        JobOutcome::Completed(report) => {
            println!(
                "Saved: {} ({} frames, crop {:.4}{})",
                report.output.display(),
                report.frames_written,
                report.crop,
                if report.audio_merged { ", with audio" } else { "" }
            );
            Ok(())
        }
        JobOutcome::Cancelled => bail!("stabilization was cancelled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crop() {
        assert_eq!(parse_crop("auto").unwrap(), CropMode::Auto);
        assert_eq!(parse_crop("0.05").unwrap(), CropMode::Fixed(0.05));
        assert!(parse_crop("wide").is_err());
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("1280x720").unwrap(), (1280, 720));
        assert!(parse_resolution("1280").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = JobArgs {
            algorithm: Some("panning-b".into()),
            strength: Some(3),
            crop: Some("0".into()),
            fps: Some("24".into()),
            codec: Some("h264".into()),
            keep_audio: true,
            ..JobArgs::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.algorithm, SmoothingAlgorithm::PanningB);
        assert_eq!(config.strength, 3);
        assert_eq!(config.crop, CropMode::Fixed(0.0));
        assert_eq!(config.output_frame_rate, Some(FrameRate::FPS_24));
        assert_eq!(config.codec, VideoCodec::H264);
        assert!(config.keep_audio);
    }

    #[test]
    fn test_negative_crop_is_rejected() {
        let args = JobArgs {
            crop: Some("-1".into()),
            ..JobArgs::default()
        };
        assert!(build_config(&args).is_err());
    }
}
