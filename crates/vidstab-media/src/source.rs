//! Restartable frame providers.

use std::path::Path;

use vidstab_core::{FrameBuffer, FrameRate, Result, VidstabError};

/// Visitor called as `(index, total, frame)`; returning `false` stops early.
pub type FrameVisitor<'a> = dyn FnMut(usize, usize, &FrameBuffer) -> bool + 'a;

/// A sequence of RGB frames that can be walked more than once.
///
/// Both passes of a job walk the same source, so every call to
/// [`FrameSource::for_each_frame`] starts again from the first frame.
pub trait FrameSource: Send {
    /// Short name used to derive output file names.
    fn name(&self) -> &str;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn frame_rate(&self) -> FrameRate;

    /// Expected number of frames; the actual walk may end earlier.
    fn frame_count(&self) -> usize;

    /// Rotation tag of the container, frames are always delivered upright.
    fn rotation_degrees(&self) -> i32 {
        0
    }

    /// Walk the frames in order. A short read ends the walk without error.
    fn for_each_frame(&mut self, visitor: &mut FrameVisitor<'_>) -> Result<()>;
}

/// Stem of a file name up to the first dot, `"unknown"` when missing.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .filter(|n| !n.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Frames held in memory, used for tests and for embedding callers that
/// already have decoded frames.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    frame_rate: FrameRate,
    frames: Vec<FrameBuffer>,
}

impl MemorySource {
    pub fn new(
        name: impl Into<String>,
        frame_rate: FrameRate,
        frames: Vec<FrameBuffer>,
    ) -> Result<Self> {
        if !frame_rate.is_valid() {
            return Err(VidstabError::InvalidParameter(format!(
                "invalid frame rate {}/{}",
                frame_rate.numerator, frame_rate.denominator
            )));
        }
        if let Some(first) = frames.first() {
            if frames.iter().any(|f| !f.same_shape(first)) {
                return Err(VidstabError::InvalidParameter(
                    "all frames must share size and format".into(),
                ));
            }
        }
        Ok(Self {
            name: name.into(),
            frame_rate,
            frames,
        })
    }

    pub fn frames(&self) -> &[FrameBuffer] {
        &self.frames
    }
}

impl FrameSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> u32 {
        self.frames.first().map_or(0, |f| f.width)
    }

    fn height(&self) -> u32 {
        self.frames.first().map_or(0, |f| f.height)
    }

    fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn for_each_frame(&mut self, visitor: &mut FrameVisitor<'_>) -> Result<()> {
        let total = self.frames.len();
        for (i, frame) in self.frames.iter().enumerate() {
            if !visitor(i, total, frame) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vidstab_core::PixelFormat;

    #[test]
    fn test_source_name() {
        assert_eq!(source_name(&PathBuf::from("/tmp/holiday.clip.mp4")), "holiday");
        assert_eq!(source_name(&PathBuf::from("/")), "unknown");
    }

    #[test]
    fn test_memory_source_stops_early() {
        let frames = vec![FrameBuffer::new(4, 4, PixelFormat::Rgb8); 5];
        let mut src = MemorySource::new("mem", FrameRate::FPS_30, frames).unwrap();
        let mut seen = Vec::new();
        src.for_each_frame(&mut |i, total, _| {
            seen.push((i, total));
            i < 2
        })
        .unwrap();
        assert_eq!(seen, vec![(0, 5), (1, 5), (2, 5)]);

        // restartable
        let mut count = 0;
        src.for_each_frame(&mut |_, _, _| {
            count += 1;
            true
        })
        .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_memory_source_rejects_mixed_shapes() {
        let frames = vec![
            FrameBuffer::new(4, 4, PixelFormat::Rgb8),
            FrameBuffer::new(8, 4, PixelFormat::Rgb8),
        ];
        assert!(MemorySource::new("mem", FrameRate::FPS_30, frames).is_err());
        assert!(MemorySource::new("mem", FrameRate::new(0, 1), Vec::new()).is_err());
    }
}
