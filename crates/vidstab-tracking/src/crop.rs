//! Zoom needed to hide the borders exposed by the corrections.

use serde::{Deserialize, Serialize};
use vidstab_core::CorrectiveTransform;

/// Crops below this are treated as no zoom at all.
pub const MIN_CROP: f64 = 0.001;

/// Safety margin added to an automatically estimated crop.
pub const AUTO_CROP_MARGIN: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropMode {
    /// Derived from the largest correction.
    #[default]
    Auto,
    /// Used as is, 0 disables the zoom.
    Fixed(f64),
}

/// Border fraction one correction exposes, before the margin.
pub fn frame_crop(c: &CorrectiveTransform, width: u32, height: u32) -> f64 {
    if width == 0 || height == 0 {
        return 0.0;
    }
    let left = c.dx.max(0.0);
    let right = (-c.dx).max(0.0);
    let rotation = height as f64 * c.da.sin().abs();
    let top = c.dy.max(0.0) + rotation;
    let bottom = (-c.dy).max(0.0) + rotation;

    // the zoom is centered so a border on one side costs twice its width
    let horizontal = 2.0 * left.max(right) / width as f64;
    let vertical = 2.0 * top.max(bottom) / height as f64;
    horizontal.max(vertical)
}

/// Zoom ratio for the whole clip.
pub fn estimate_crop(
    corrections: &[CorrectiveTransform],
    width: u32,
    height: u32,
    mode: CropMode,
) -> f64 {
    match mode {
        CropMode::Fixed(ratio) => ratio,
        CropMode::Auto => {
            let worst = corrections
                .iter()
                .map(|c| frame_crop(c, width, height))
                .fold(0.0f64, f64::max);
            worst + AUTO_CROP_MARGIN
        }
    }
}

/// Whether a crop ratio requires the zoom pass.
pub fn needs_zoom(crop: f64) -> bool {
    crop >= MIN_CROP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_passthrough() {
        let c = [CorrectiveTransform::new(100.0, 50.0, 0.3)];
        assert_eq!(estimate_crop(&c, 640, 480, CropMode::Fixed(0.0)), 0.0);
        assert_eq!(estimate_crop(&c, 640, 480, CropMode::Fixed(0.15)), 0.15);
        assert_eq!(estimate_crop(&[], 640, 480, CropMode::Fixed(0.4)), 0.4);
    }

    #[test]
    fn test_auto_from_translation() {
        let c = [
            CorrectiveTransform::new(6.4, 0.0, 0.0),
            CorrectiveTransform::new(-3.2, 4.8, 0.0),
        ];
        let crop = estimate_crop(&c, 640, 480, CropMode::Auto);
        assert!((crop - (0.02 + 0.02)).abs() < 1e-12);
    }

    #[test]
    fn test_auto_rotation_term() {
        let c = [CorrectiveTransform::new(0.0, 0.0, -0.01)];
        let crop = estimate_crop(&c, 640, 480, CropMode::Auto);
        let expected = 2.0 * 480.0 * 0.01f64.sin() / 480.0 + 0.02;
        assert!((crop - expected).abs() < 1e-12);
    }

    #[test]
    fn test_auto_identity_is_margin_only() {
        let c = vec![CorrectiveTransform::IDENTITY; 10];
        assert_eq!(estimate_crop(&c, 640, 480, CropMode::Auto), AUTO_CROP_MARGIN);
        assert!(needs_zoom(AUTO_CROP_MARGIN));
        assert!(!needs_zoom(0.0005));
    }

    #[test]
    fn test_crop_mode_serde() {
        let auto: CropMode = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto, CropMode::Auto);
        let fixed: CropMode = serde_json::from_str("{\"fixed\": 0.1}").unwrap();
        assert_eq!(fixed, CropMode::Fixed(0.1));
    }
}
