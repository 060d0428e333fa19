//! Path smoothing and crop scenarios across tracking and pipeline.

use vidstab_core::{CorrectiveTransform, FrameRate, VideoProperties};
use vidstab_pipeline::{Analysis, Stabilizer, StabilizeConfig};
use vidstab_tracking::{
    distribute, estimate_crop, moving_average, smooth, window_size, CropMode, SmoothingAlgorithm,
    Trajectory,
};

fn trajectory(x: &[f64], y: &[f64], a: &[f64]) -> Trajectory {
    let mut t = Trajectory::new();
    for ((&x, &y), &a) in x.iter().zip(y).zip(a) {
        t.push(x, y, a);
    }
    t
}

#[test]
fn distribute_reaches_the_last_sample_linearly() {
    let out = distribute(&[0.0, 5.0, 10.0, -5.0]);
    let expected = [0.0, -1.667, -3.333, -5.0];
    for (o, e) in out.iter().zip(expected) {
        assert!((o - e).abs() < 1e-3, "{out:?}");
    }
}

#[test]
fn symmetric_shake_averages_out() {
    let out = moving_average(&[0.0, 10.0, -10.0, 0.0, 0.0], 2);
    for v in &out[..4] {
        assert!(v.abs() < 1e-12, "{out:?}");
    }
    // the last window only sees [-10, 0, 0]
    assert!((out[4] + 10.0 / 3.0).abs() < 1e-12);
}

#[test]
fn still_uses_the_anchored_path_as_correction() {
    let t = trajectory(&[0.0, -3.0, 2.0], &[0.0, 1.0, -1.0], &[0.0, 0.01, -0.02]);
    let corrections = smooth(&t, SmoothingAlgorithm::Still, 30);
    assert_eq!(
        corrections,
        vec![
            CorrectiveTransform::new(0.0, 0.0, 0.0),
            CorrectiveTransform::new(-3.0, 1.0, 0.01),
            CorrectiveTransform::new(2.0, -1.0, -0.02),
        ]
    );
}

#[test]
fn every_algorithm_yields_one_correction_per_frame() {
    let x: Vec<f64> = (0..25).map(|i| (i as f64 * 0.7).sin() * 4.0 + i as f64).collect();
    let y: Vec<f64> = (0..25).map(|i| (i as f64 * 1.3).cos() * 2.0).collect();
    let a: Vec<f64> = (0..25).map(|i| (i as f64 * 0.4).sin() * 0.01).collect();
    let t = trajectory(&x, &y, &a);
    for algorithm in SmoothingAlgorithm::ALL {
        let corrections = smooth(&t, algorithm, 3);
        assert_eq!(corrections.len(), 25, "{algorithm}");
    }

    // panning targets are exact at both ends
    let panning = smooth(&t, SmoothingAlgorithm::Panning, 3);
    assert!(panning[0].dx.abs() < 1e-12 && panning[24].dx.abs() < 1e-12);
    assert!(panning[0].dy.abs() < 1e-12 && panning[24].dy.abs() < 1e-12);
    // rotation is removed entirely
    for (c, raw) in panning.iter().zip(&a) {
        assert!((c.da + raw).abs() < 1e-12);
    }
}

#[test]
fn fixed_crop_passes_through() {
    let corrections = [CorrectiveTransform::new(40.0, -30.0, 0.2)];
    assert_eq!(estimate_crop(&corrections, 640, 480, CropMode::Fixed(0.0)), 0.0);
    assert_eq!(estimate_crop(&corrections, 640, 480, CropMode::Fixed(0.15)), 0.15);
}

#[test]
fn window_follows_output_rate_and_strength() {
    assert_eq!(window_size(FrameRate::FPS_30, 0), 30);
    assert_eq!(window_size(FrameRate::FPS_29_97, 1), 60);
    assert_eq!(window_size(FrameRate::FPS_24, 3), 96);

    let stabilizer = Stabilizer::new(StabilizeConfig {
        strength: 0,
        ..StabilizeConfig::default()
    })
    .unwrap();
    let analysis = Analysis {
        properties: VideoProperties::new(320, 240, FrameRate::FPS_25, 90, 5),
        trajectory: trajectory(&[0.0; 5], &[0.0; 5], &[0.0; 5]),
        algorithm: SmoothingAlgorithm::Generic,
    };
    let plan = stabilizer.plan(&analysis);
    assert_eq!(plan.window, 25);
    assert_eq!(plan.output_rate, FrameRate::FPS_25);
    assert!(plan.corrections.iter().all(|c| c.magnitude() == 0.0));
}
