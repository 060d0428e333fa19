//! End-to-end stabilization through the pipeline with in-memory encoding.

use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use vidstab_core::{FrameRate, VidstabError};
use vidstab_media::{ImageSequenceSource, MemoryBackend, MemoryEncoderProvider, MemorySource};
use vidstab_pipeline::{JobOutcome, JobRegistry, Pass, Stabilizer, StabilizeConfig};
use vidstab_tracking::{CropMode, SmoothingAlgorithm, AUTO_CROP_MARGIN};

use crate::synthetic::{panning_source, shifted_frame, texture, HEIGHT, WIDTH};

fn job(config: StabilizeConfig, provider: &MemoryEncoderProvider) -> Stabilizer {
    Stabilizer::new(config)
        .unwrap()
        .with_encoder_provider(Arc::new(provider.clone()))
}

// ── Constant motion ────────────────────────────────────────────

#[test]
fn constant_pan_is_measured_per_frame() {
    let provider = MemoryEncoderProvider::new();
    let stabilizer = job(StabilizeConfig::default(), &provider);
    let mut source = panning_source(10, 2.0, FrameRate::FPS_30);

    let analysis = stabilizer.analyze(&mut source).unwrap().unwrap();
    let t = &analysis.trajectory;
    assert_eq!(t.len(), 10);
    assert_eq!(analysis.properties.frame_count(), 10);
    assert_eq!((t.x()[0], t.y()[0], t.a()[0]), (0.0, 0.0, 0.0));
    for i in 1..t.len() {
        let dx = t.x()[i] - t.x()[i - 1];
        let dy = t.y()[i] - t.y()[i - 1];
        let da = t.a()[i] - t.a()[i - 1];
        assert!((dx - 2.0).abs() < 0.25, "frame {i}: dx = {dx}");
        assert!(dy.abs() < 0.25, "frame {i}: dy = {dy}");
        assert!(da.abs() < 0.01, "frame {i}: da = {da}");
    }
}

#[test]
fn linear_path_needs_no_correction_inside_the_window() {
    let provider = MemoryEncoderProvider::new();
    let config = StabilizeConfig {
        algorithm: SmoothingAlgorithm::Generic,
        strength: 0,
        output_frame_rate: Some(FrameRate::from_fps(1)),
        ..StabilizeConfig::default()
    };
    let stabilizer = job(config, &provider);
    let mut source = panning_source(10, 2.0, FrameRate::FPS_30);

    let analysis = stabilizer.analyze(&mut source).unwrap().unwrap();
    let plan = stabilizer.plan(&analysis);
    assert_eq!(plan.window, 1);
    assert_eq!(plan.corrections.len(), 10);
    for c in &plan.corrections[1..9] {
        assert!(c.dx.abs() < 0.25, "interior correction {c:?}");
        assert!(c.dy.abs() < 0.25);
        assert!(c.da.abs() < 0.01);
    }
    // only the clamped ends are pulled by about one step
    assert!(plan.crop >= AUTO_CROP_MARGIN);
    assert!(plan.crop < AUTO_CROP_MARGIN + 0.03, "crop = {}", plan.crop);
}

#[test]
fn panning_algorithm_keeps_a_steady_pan() {
    let provider = MemoryEncoderProvider::new();
    let config = StabilizeConfig {
        algorithm: SmoothingAlgorithm::Panning,
        ..StabilizeConfig::default()
    };
    let stabilizer = job(config, &provider);
    let mut source = panning_source(10, 2.0, FrameRate::FPS_30);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("pan.mp4");

    let outcome = stabilizer
        .run(&mut source, Path::new("pan.mov"), &out)
        .unwrap();
    let JobOutcome::Completed(report) = outcome else {
        panic!("job was cancelled");
    };
    assert_eq!(report.frames_written, 10);
    assert!((report.crop - AUTO_CROP_MARGIN).abs() < 0.01, "crop = {}", report.crop);

    let rec = provider.container.snapshot();
    assert_eq!(rec.tracks.len(), 1);
    assert_eq!(rec.tracks[0].width, WIDTH);
    assert_eq!(rec.tracks[0].height, HEIGHT);
    assert_eq!(rec.samples.len(), 10);
    assert!(rec.started && rec.stopped && rec.released);
    let pts: Vec<_> = rec.samples.iter().map(|(_, s)| s.pts_us).collect();
    assert_eq!(pts[1], Some(33_333));
}

#[test]
fn still_algorithm_pins_every_frame_to_the_first() {
    let provider = MemoryEncoderProvider::new();
    let config = StabilizeConfig {
        algorithm: SmoothingAlgorithm::Still,
        crop: CropMode::Fixed(0.0),
        ..StabilizeConfig::default()
    };
    let stabilizer = job(config, &provider);
    let mut source = MemorySource::new(
        "shake",
        FrameRate::FPS_30,
        [0.0f32, 3.0, -2.0, 1.0]
            .iter()
            .map(|&s| shifted_frame(WIDTH, HEIGHT, s, 0.0))
            .collect(),
    )
    .unwrap();

    let analysis = stabilizer.analyze(&mut source).unwrap().unwrap();
    let plan = stabilizer.plan(&analysis);
    assert_eq!(plan.crop, 0.0);
    for (c, shift) in plan.corrections.iter().zip([0.0, 3.0, -2.0, 1.0]) {
        assert!((c.dx + shift).abs() < 0.3, "correction {c:?} for shift {shift}");
    }
}

// ── Image sequences ────────────────────────────────────────────

#[test]
fn image_sequence_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    for i in 0..4u32 {
        let img = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
            let v = (texture(x as f32 - i as f32, y as f32) * 255.0) as u8;
            Rgb([v, v, v])
        });
        img.save(frames.join(format!("img_{i:02}.png"))).unwrap();
    }

    let mut source = ImageSequenceSource::from_dir(&frames, Some((WIDTH, HEIGHT))).unwrap();
    let provider = MemoryEncoderProvider::new();
    let stabilizer = job(StabilizeConfig::default(), &provider);
    let out = dir.path().join("img_00.mp4");

    let outcome = stabilizer.run(&mut source, &frames, &out).unwrap();
    assert!(!outcome.is_cancelled());
    let rec = provider.container.snapshot();
    assert_eq!(rec.samples.len(), 4);
    assert_eq!(rec.tracks[0].frame_rate, FrameRate::FPS_30);
}

// ── Cancellation and exclusivity ───────────────────────────────

#[test]
fn cancelling_during_analysis_writes_nothing() {
    let provider = MemoryEncoderProvider::new();
    let passes = Arc::new(Mutex::new(Vec::new()));
    let sink = passes.clone();
    let stabilizer = job(StabilizeConfig::default(), &provider);
    let cancel = stabilizer.cancel_token();
    let stabilizer = stabilizer.with_progress(move |p| {
        sink.lock().push(p.pass);
        if p.frame_index == 2 {
            cancel.cancel();
        }
    });
    let mut source = panning_source(8, 1.0, FrameRate::FPS_30);

    let outcome = stabilizer
        .run(&mut source, Path::new("a.mov"), Path::new("a.mp4"))
        .unwrap();
    assert!(outcome.is_cancelled());
    assert!(passes.lock().iter().all(|p| *p == Pass::Analyze));
    assert_eq!(passes.lock().len(), 3);
    let rec = provider.container.snapshot();
    assert!(rec.tracks.is_empty() && rec.samples.is_empty());
}

#[test]
fn overlapping_jobs_are_busy_until_released() {
    let registry = JobRegistry::new();
    let provider = MemoryEncoderProvider::new();
    let stabilizer = job(StabilizeConfig::default(), &provider).with_registry(registry.clone());

    let lease = registry
        .acquire(Path::new("a.mov"), Path::new("elsewhere.mp4"))
        .unwrap();
    let mut source = panning_source(3, 1.0, FrameRate::FPS_30);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("a.mp4");
    let err = stabilizer
        .run(&mut source, Path::new("a.mov"), &out)
        .unwrap_err();
    assert!(matches!(err, VidstabError::JobBusy(_)));

    drop(lease);
    let outcome = stabilizer
        .run(&mut source, Path::new("a.mov"), &out)
        .unwrap();
    assert!(!outcome.is_cancelled());
    assert!(registry.is_empty());
}

#[test]
fn failed_encoder_leaves_an_existing_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("clip.mp4");
    std::fs::write(&out, b"keep me").unwrap();
    let provider = MemoryEncoderProvider {
        backend: MemoryBackend::failing(),
        ..MemoryEncoderProvider::new()
    };
    let stabilizer = job(StabilizeConfig::default(), &provider);
    let mut source = panning_source(4, 1.0, FrameRate::FPS_30);

    let err = stabilizer
        .run(&mut source, Path::new("clip.mov"), &out)
        .unwrap_err();
    assert!(matches!(err, VidstabError::EncoderOpen(_)));
    assert_eq!(std::fs::read(&out).unwrap(), b"keep me");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn one_provider_serves_consecutive_jobs() {
    let provider = MemoryEncoderProvider::new();
    let stabilizer = job(StabilizeConfig::default(), &provider);
    let dir = tempfile::tempdir().unwrap();

    for (name, count) in [("first", 5), ("second", 3)] {
        let mut source = panning_source(count, 1.0, FrameRate::FPS_30);
        let out = dir.path().join(format!("{name}.mp4"));
        let outcome = stabilizer
            .run(&mut source, Path::new(name), &out)
            .unwrap();
        let JobOutcome::Completed(report) = outcome else {
            panic!("{name} was cancelled");
        };
        assert_eq!(report.frames_written, count);
        let rec = provider.container.snapshot();
        assert_eq!(rec.tracks.len(), 1, "{name}");
        assert_eq!(rec.samples.len(), count, "{name}");
        assert!(rec.released && !rec.discarded);
    }
}
