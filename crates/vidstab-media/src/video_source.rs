//! Video file frame source using FFmpeg via ffmpeg-sidecar.

use ffmpeg_sidecar::command::{ffmpeg_is_installed, FfmpegCommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vidstab_core::{FrameBuffer, FrameRate, PixelFormat, Result, VidstabError};

use crate::probe::{count_video_packets, MediaProbe, VideoStreamInfo};
use crate::source::{source_name, FrameSource, FrameVisitor};

/// Decodes a video file to upright RGB frames.
///
/// Spawns FFmpeg as a subprocess for every walk, so no FFmpeg development
/// headers are needed. The rotation tag is honored by FFmpeg's autorotate.
pub struct VideoFileSource {
    path: PathBuf,
    name: String,
    stream: VideoStreamInfo,
    width: u32,
    height: u32,
    frame_count: usize,
}

impl VideoFileSource {
    /// Open a video file and read its metadata.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening video file: {}", path.display());

        if !ffmpeg_is_installed() {
            return Err(VidstabError::SourceUnavailable(
                "ffmpeg is required for decoding, but was not found".to_string(),
            ));
        }

        let probe = MediaProbe::probe(path)?;
        let stream = probe.primary_video().cloned().ok_or_else(|| {
            VidstabError::SourceUnavailable(format!("no video stream in {}", path.display()))
        })?;
        let (width, height) = stream.display_size();
        if width == 0 || height == 0 {
            return Err(VidstabError::SourceUnavailable(format!(
                "video stream of {} has no size",
                path.display()
            )));
        }

        let frame_count = match stream.frame_count {
            Some(n) => n,
            None => count_video_packets(path).unwrap_or_else(|e| {
                warn!("could not count frames of {}: {}", path.display(), e);
                0
            }),
        };

        debug!(
            width,
            height,
            rate = %stream.frame_rate,
            rotation = stream.rotation_degrees,
            frame_count,
            "video source opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            name: source_name(path),
            stream,
            width,
            height,
            frame_count,
        })
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn codec(&self) -> &str {
        &self.stream.codec
    }
}

impl FrameSource for VideoFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn frame_rate(&self) -> FrameRate {
        self.stream.frame_rate
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn rotation_degrees(&self) -> i32 {
        self.stream.rotation_degrees
    }

    fn for_each_frame(&mut self, visitor: &mut FrameVisitor<'_>) -> Result<()> {
        let mut child = FfmpegCommand::new()
            .hide_banner()
            .input(self.path.to_string_lossy().as_ref())
            .args(["-map", "0:v:0"])
            .rawvideo()
            .spawn()
            .map_err(|e| VidstabError::SourceUnavailable(format!("failed to spawn ffmpeg: {e}")))?;

        let frames = child
            .iter()
            .map_err(|e| VidstabError::SourceUnavailable(format!("ffmpeg output: {e}")))?;

        let total = self.frame_count;
        let mut index = 0usize;
        let mut finished = true;
        for frame in frames.filter_frames() {
            if total > 0 && index >= total {
                finished = false;
                break;
            }
            let buffer =
                FrameBuffer::from_raw(frame.width, frame.height, PixelFormat::Rgb8, frame.data)?;
            if !visitor(index, total, &buffer) {
                finished = false;
                break;
            }
            index += 1;
        }

        if !finished {
            // the decoder is still writing frames nobody will read
            if let Err(e) = child.kill() {
                debug!("ffmpeg already exited: {e}");
            }
        }
        if let Err(e) = child.wait() {
            warn!("failed to reap ffmpeg: {e}");
        }
        debug!(frames = index, "video walk finished");
        Ok(())
    }
}
