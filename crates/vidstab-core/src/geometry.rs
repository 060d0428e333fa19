//! Motion samples, corrective transforms and the affine matrices built from them.

use glam::{DAffine2, DVec2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::Neg;

/// Wrap an angle into (-pi, pi].
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Estimated camera motion between two analyzed frames.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionSample {
    pub dx: f64,
    pub dy: f64,
    /// Rotation in radians, always in (-pi, pi].
    pub da: f64,
}

impl MotionSample {
    pub const ZERO: Self = Self {
        dx: 0.0,
        dy: 0.0,
        da: 0.0,
    };

    pub fn new(dx: f64, dy: f64, da: f64) -> Self {
        Self {
            dx,
            dy,
            da: normalize_angle(da),
        }
    }

    /// Read translation and rotation out of a similarity matrix.
    pub fn from_affine(m: &DAffine2) -> Self {
        let t00 = m.matrix2.x_axis.x;
        let t10 = m.matrix2.x_axis.y;
        Self::new(m.translation.x, m.translation.y, t10.atan2(t00))
    }
}

impl Neg for MotionSample {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.dx, -self.dy, -self.da)
    }
}

/// Per-frame correction: target trajectory minus raw trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrectiveTransform {
    pub dx: f64,
    pub dy: f64,
    pub da: f64,
}

impl CorrectiveTransform {
    pub const IDENTITY: Self = Self {
        dx: 0.0,
        dy: 0.0,
        da: 0.0,
    };

    #[inline]
    pub const fn new(dx: f64, dy: f64, da: f64) -> Self {
        Self { dx, dy, da }
    }

    /// `[[cos a, -sin a, dx], [sin a, cos a, dy]]`
    pub fn to_affine(self) -> DAffine2 {
        DAffine2::from_angle_translation(self.da, DVec2::new(self.dx, self.dy))
    }

    /// Largest absolute component, handy for "is this a no-op" checks.
    pub fn magnitude(self) -> f64 {
        self.dx.abs().max(self.dy.abs()).max(self.da.abs())
    }
}

/// Uniform zoom of `1 + crop` about `center`, no rotation.
pub fn center_zoom(crop: f64, center: DVec2) -> DAffine2 {
    let scale = 1.0 + crop;
    DAffine2::from_scale_angle_translation(DVec2::splat(scale), 0.0, center * (1.0 - scale))
}
