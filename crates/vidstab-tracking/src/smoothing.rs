//! Target camera paths and the corrections that move frames onto them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vidstab_core::{CorrectiveTransform, FrameRate, VidstabError};

use crate::trajectory::{Trajectory, TrajectoryMode};

/// Mean over `seq[i - window ..= i + window]`, clamped at both ends.
///
/// The divisor is the number of samples actually inside the window.
pub fn moving_average(seq: &[f64], window: usize) -> Vec<f64> {
    let n = seq.len();
    if n == 0 {
        return Vec::new();
    }
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &v in seq {
        acc += v;
        prefix.push(acc);
    }
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(window);
            let hi = (i + window).min(n - 1);
            (prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64
        })
        .collect()
}

/// Straight line from the first to the last sample.
pub fn distribute(seq: &[f64]) -> Vec<f64> {
    let n = seq.len();
    match n {
        0 => Vec::new(),
        1 => vec![seq[0]],
        _ => {
            let first = seq[0];
            let last = seq[n - 1];
            let span = (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        last
                    } else {
                        first + (last - first) * i as f64 / span
                    }
                })
                .collect()
        }
    }
}

/// `target[i] - raw[i]`
pub fn delta(raw: &[f64], target: &[f64]) -> Vec<f64> {
    raw.iter().zip(target).map(|(r, t)| t - r).collect()
}

/// Camera path smoothing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmoothingAlgorithm {
    #[default]
    Generic,
    GenericB,
    Still,
    HorizontalPanning,
    HorizontalPanningB,
    VerticalPanning,
    VerticalPanningB,
    Panning,
    PanningB,
    NoRotation,
}

/// Target derivation for one trajectory axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisTarget {
    Keep,
    Zero,
    MovingAverage,
    Distribute,
}

impl SmoothingAlgorithm {
    pub const ALL: [Self; 10] = [
        Self::Generic,
        Self::GenericB,
        Self::Still,
        Self::HorizontalPanning,
        Self::HorizontalPanningB,
        Self::VerticalPanning,
        Self::VerticalPanningB,
        Self::Panning,
        Self::PanningB,
        Self::NoRotation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::GenericB => "generic-b",
            Self::Still => "still",
            Self::HorizontalPanning => "horizontal-panning",
            Self::HorizontalPanningB => "horizontal-panning-b",
            Self::VerticalPanning => "vertical-panning",
            Self::VerticalPanningB => "vertical-panning-b",
            Self::Panning => "panning",
            Self::PanningB => "panning-b",
            Self::NoRotation => "no-rotation",
        }
    }

    pub fn trajectory_mode(self) -> TrajectoryMode {
        match self {
            Self::Still => TrajectoryMode::Anchored,
            _ => TrajectoryMode::Cumulative,
        }
    }

    /// Targets for x, y and angle; `None` means the raw trajectory is the
    /// correction itself.
    fn targets(self) -> Option<[AxisTarget; 3]> {
        use AxisTarget::*;
        Some(match self {
            Self::Generic => [MovingAverage, MovingAverage, MovingAverage],
            Self::GenericB => [MovingAverage, MovingAverage, Zero],
            Self::Still => return None,
            Self::HorizontalPanning => [Distribute, Zero, Zero],
            Self::HorizontalPanningB => [Distribute, Zero, MovingAverage],
            Self::VerticalPanning => [Zero, Distribute, Zero],
            Self::VerticalPanningB => [Zero, Distribute, MovingAverage],
            Self::Panning => [Distribute, Distribute, Zero],
            Self::PanningB => [Distribute, Distribute, MovingAverage],
            Self::NoRotation => [Keep, Keep, Zero],
        })
    }
}

impl fmt::Display for SmoothingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SmoothingAlgorithm {
    type Err = VidstabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VidstabError::InvalidParameter(format!("unknown algorithm '{s}'")))
    }
}

/// Smoothing window in frames on each side: `round(fps) * (strength + 1)`.
pub fn window_size(output_rate: FrameRate, strength: u32) -> usize {
    output_rate.rounded_fps() as usize * (strength as usize + 1)
}

fn axis_target(target: AxisTarget, raw: &[f64], window: usize) -> Vec<f64> {
    match target {
        AxisTarget::Keep => raw.to_vec(),
        AxisTarget::Zero => vec![0.0; raw.len()],
        AxisTarget::MovingAverage => moving_average(raw, window),
        AxisTarget::Distribute => distribute(raw),
    }
}

/// Per-frame corrections moving the raw `trajectory` onto the target path.
pub fn smooth(
    trajectory: &Trajectory,
    algorithm: SmoothingAlgorithm,
    window: usize,
) -> Vec<CorrectiveTransform> {
    let Some([tx, ty, ta]) = algorithm.targets() else {
        return (0..trajectory.len())
            .filter_map(|i| trajectory.get(i))
            .map(|(x, y, a)| CorrectiveTransform::new(x, y, a))
            .collect();
    };
    let dx = delta(trajectory.x(), &axis_target(tx, trajectory.x(), window));
    let dy = delta(trajectory.y(), &axis_target(ty, trajectory.y(), window));
    let da = delta(trajectory.a(), &axis_target(ta, trajectory.a(), window));
    dx.into_iter()
        .zip(dy)
        .zip(da)
        .map(|((dx, dy), da)| CorrectiveTransform::new(dx, dy, da))
        .collect()
}
