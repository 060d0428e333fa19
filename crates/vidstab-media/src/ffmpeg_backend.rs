//! FFmpeg-backed encoder seams.
//!
//! [`FfmpegBackend`] pipes raw RGB frames into an `ffmpeg` process and reads
//! back the Annex-B elementary stream. [`ElementaryStreamMuxer`] stages that
//! stream on disk and remuxes it into MP4 when stopped.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use ffmpeg_sidecar::command::ffmpeg_is_installed;
use ffmpeg_sidecar::paths::ffmpeg_path;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use vidstab_core::{FrameBuffer, PixelFormat, Result, VidstabError};

use crate::encoder::{
    ContainerWriter, EncodedSample, EncoderBackend, EncoderOutput, EncoderProvider,
    EncoderSettings, TrackFormat, VideoEncoder,
};

const READ_CHUNK: usize = 64 * 1024;

fn ffmpeg_binary() -> Result<PathBuf> {
    if !ffmpeg_is_installed() {
        return Err(VidstabError::EncoderOpen(
            "ffmpeg is required for encoding, but was not found".to_string(),
        ));
    }
    Ok(ffmpeg_path())
}

fn rate_arg(settings: &EncoderSettings) -> String {
    format!(
        "{}/{}",
        settings.frame_rate.numerator, settings.frame_rate.denominator
    )
}

/// Arguments of the encoding process: raw RGB on stdin, elementary stream
/// on stdout.
pub fn encode_args(settings: &EncoderSettings) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        PixelFormat::Rgb8.ffmpeg_name().into(),
        "-video_size".into(),
        format!("{}x{}", settings.width, settings.height),
        "-framerate".into(),
        rate_arg(settings),
        "-i".into(),
        "pipe:0".into(),
    ];

    // yuv420p needs even dimensions
    if settings.width % 2 != 0 || settings.height % 2 != 0 {
        args.extend(["-vf".into(), "pad=ceil(iw/2)*2:ceil(ih/2)*2".into()]);
    }

    args.extend([
        "-c:v".into(),
        settings.codec.ffmpeg_encoder().into(),
        "-b:v".into(),
        settings.bit_rate.to_string(),
        "-g".into(),
        settings.key_frame_interval_frames().to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-f".into(),
        settings.codec.elementary_format().into(),
        "pipe:1".into(),
    ]);
    args
}

/// Arguments that copy a staged elementary stream into an MP4 container.
pub fn remux_args(format: &TrackFormat, staging: &Path, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-r".into(),
        format!(
            "{}/{}",
            format.frame_rate.numerator, format.frame_rate.denominator
        ),
        "-f".into(),
        format.codec.elementary_format().into(),
        "-i".into(),
        staging.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
    ];
    if let Some(tag) = format.codec.mp4_tag() {
        args.extend(["-tag:v".into(), tag.into()]);
    }
    args.extend([
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

/// Encoder running as an `ffmpeg` child process.
#[derive(Default)]
pub struct FfmpegBackend {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    chunks: Option<Receiver<std::io::Result<Vec<u8>>>>,
    reader: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<String>>,
    format: Option<TrackFormat>,
    format_sent: bool,
    stashed: Option<Vec<u8>>,
    frame_size: usize,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn stderr_tail(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|h| h.join().ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    fn sample(data: Vec<u8>) -> EncoderOutput {
        EncoderOutput::Sample(EncodedSample {
            data,
            pts_us: None,
            key_frame: false,
        })
    }
}

impl EncoderBackend for FfmpegBackend {
    fn configure(&mut self, settings: &EncoderSettings) -> Result<()> {
        let ffmpeg = ffmpeg_binary()?;
        let args = encode_args(settings);
        debug!(?args, "spawning ffmpeg encoder");

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VidstabError::EncoderOpen(format!("Failed to spawn ffmpeg: {e}")))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(mut stdout), Some(mut stderr)) = (stdin, stdout, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(VidstabError::EncoderOpen(
                "Failed to open ffmpeg pipes".to_string(),
            ));
        };

        let (tx, rx) = crossbeam_channel::unbounded();
        self.reader = Some(std::thread::spawn(move || {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        }));
        self.stderr = Some(std::thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        }));

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.chunks = Some(rx);
        self.format = Some(TrackFormat::from_settings(settings));
        self.frame_size = PixelFormat::Rgb8.frame_size(settings.width, settings.height);
        Ok(())
    }

    fn queue_frame(&mut self, frame: &FrameBuffer, _pts_us: i64) -> Result<()> {
        if frame.format != PixelFormat::Rgb8 || frame.data.len() != self.frame_size {
            return Err(VidstabError::InvalidParameter(format!(
                "encoder expects {} bytes of RGB, got {:?} {}x{}",
                self.frame_size, frame.format, frame.width, frame.height
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(VidstabError::Muxer(
                "ffmpeg input is already closed".to_string(),
            ));
        };
        if let Err(e) = stdin.write_all(&frame.data) {
            self.stdin = None;
            let tail = self.stderr_tail();
            return Err(VidstabError::Muxer(format!(
                "Failed to write frame: {e} {tail}"
            )));
        }
        Ok(())
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderOutput> {
        if let Some(data) = self.stashed.take() {
            return Ok(Self::sample(data));
        }
        let Some(rx) = self.chunks.as_ref() else {
            return Ok(EncoderOutput::EndOfStream);
        };
        match rx.recv_timeout(timeout) {
            Ok(Ok(data)) => {
                if !self.format_sent {
                    self.format_sent = true;
                    self.stashed = Some(data);
                    let format = self.format.clone().ok_or_else(|| {
                        VidstabError::Muxer("encoder produced output before configure".into())
                    })?;
                    return Ok(EncoderOutput::FormatChanged(format));
                }
                Ok(Self::sample(data))
            }
            Ok(Err(e)) => Err(VidstabError::Muxer(format!("Failed to read ffmpeg output: {e}"))),
            Err(RecvTimeoutError::Timeout) => Ok(EncoderOutput::TryAgainLater),
            Err(RecvTimeoutError::Disconnected) => Ok(EncoderOutput::EndOfStream),
        }
    }

    fn signal_end_of_stream(&mut self) -> Result<()> {
        // closing stdin lets ffmpeg flush and exit
        self.stdin = None;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.stdin = None;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.chunks = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| VidstabError::Muxer(format!("Failed to wait for ffmpeg: {e}")))?;
        let tail = self.stderr_tail();
        if !status.success() {
            return Err(VidstabError::Muxer(format!(
                "ffmpeg exited with status: {status} {tail}"
            )));
        }
        if !tail.is_empty() {
            debug!("ffmpeg: {tail}");
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.stdin = None;
        self.chunks = None;
        self.stashed = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        let _ = self.stderr_tail();
    }
}

impl Drop for FfmpegBackend {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.abort();
        }
    }
}

/// Writes the elementary stream next to the output and remuxes it to MP4.
pub struct ElementaryStreamMuxer {
    output: PathBuf,
    staging: Option<PathBuf>,
    file: Option<BufWriter<File>>,
    format: Option<TrackFormat>,
    /// Set once ffmpeg may have created `output`.
    remuxed: bool,
}

impl ElementaryStreamMuxer {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            staging: None,
            file: None,
            format: None,
            remuxed: false,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn remove_staging(&mut self) {
        self.file = None;
        if let Some(staging) = self.staging.take() {
            if let Err(e) = std::fs::remove_file(&staging) {
                debug!("no staging file to remove at {}: {e}", staging.display());
            }
        }
    }
}

impl ContainerWriter for ElementaryStreamMuxer {
    fn add_track(&mut self, format: &TrackFormat) -> Result<usize> {
        if self.format.is_some() {
            return Err(VidstabError::Muxer(
                "only a single video track is supported".to_string(),
            ));
        }
        let ext = format!("{}.part", format.codec.elementary_format());
        self.staging = Some(self.output.with_extension(ext));
        self.format = Some(format.clone());
        Ok(0)
    }

    fn start(&mut self) -> Result<()> {
        let Some(staging) = self.staging.as_ref() else {
            return Err(VidstabError::Muxer("no track was added".to_string()));
        };
        if let Some(parent) = staging.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(staging).map_err(|e| {
            VidstabError::Muxer(format!("Failed to create {}: {e}", staging.display()))
        })?;
        self.file = Some(BufWriter::new(file));
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(VidstabError::Muxer("muxer is not started".to_string()));
        };
        if track != 0 {
            return Err(VidstabError::Muxer(format!("unknown track {track}")));
        }
        file.write_all(&sample.data)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let (Some(mut file), Some(staging), Some(format)) =
            (self.file.take(), self.staging.clone(), self.format.clone())
        else {
            return Err(VidstabError::Muxer("muxer is not started".to_string()));
        };
        file.flush()?;
        drop(file);

        let ffmpeg = ffmpeg_binary().map_err(|e| VidstabError::Muxer(e.to_string()))?;
        self.remuxed = true;
        let output = Command::new(ffmpeg)
            .args(remux_args(&format, &staging, &self.output))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| VidstabError::Muxer(format!("Failed to spawn ffmpeg: {e}")))?;
        if !output.status.success() {
            return Err(VidstabError::Muxer(format!(
                "remux to {} failed: {}",
                self.output.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        info!("Wrote {}", self.output.display());
        self.remove_staging();
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.remove_staging();
        Ok(())
    }

    fn discard(&mut self) {
        self.remove_staging();
        if self.remuxed && self.output.exists() {
            if let Err(e) = std::fs::remove_file(&self.output) {
                warn!("could not remove {}: {e}", self.output.display());
            }
        }
    }
}

/// Provider of FFmpeg-backed encoders writing MP4 files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEncoderProvider;

impl EncoderProvider for FfmpegEncoderProvider {
    fn create(&self, settings: EncoderSettings) -> Result<VideoEncoder> {
        let mut encoder = VideoEncoder::new(
            Box::new(FfmpegBackend::new()),
            Box::new(ElementaryStreamMuxer::new(&settings.output_path)),
        );
        encoder.open(settings)?;
        Ok(encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::VideoCodec;
    use vidstab_core::FrameRate;

    #[test]
    fn test_encode_args() {
        let s = EncoderSettings::new("out.mp4", 640, 360, FrameRate::FPS_30, VideoCodec::H265);
        let args = encode_args(&s);
        let joined = args.join(" ");
        assert!(joined.contains("-video_size 640x360"));
        assert!(joined.contains("-framerate 30/1"));
        assert!(joined.contains("-c:v libx265"));
        assert!(joined.contains(&format!("-b:v {}", 640 * 360 * 5)));
        assert!(joined.contains("-g 150"));
        assert!(joined.ends_with("-f hevc pipe:1"));
        assert!(!joined.contains("pad="));
    }

    #[test]
    fn test_encode_args_pad_odd_size() {
        let s = EncoderSettings::new("out.mp4", 641, 361, FrameRate::FPS_25, VideoCodec::H264);
        let joined = encode_args(&s).join(" ");
        assert!(joined.contains("pad=ceil(iw/2)*2:ceil(ih/2)*2"));
        assert!(joined.contains("-f h264 pipe:1"));
    }

    #[test]
    fn test_remux_args() {
        let s = EncoderSettings::new("out.mp4", 640, 360, FrameRate::FPS_29_97, VideoCodec::H265);
        let format = TrackFormat::from_settings(&s);
        let args = remux_args(&format, Path::new("out.hevc.part"), Path::new("out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-r 30000/1001"));
        assert!(joined.contains("-c copy -tag:v hvc1 -movflags +faststart out.mp4"));

        let h264 = TrackFormat {
            codec: VideoCodec::H264,
            ..format
        };
        assert!(!remux_args(&h264, Path::new("a"), Path::new("b"))
            .iter()
            .any(|a| a == "-tag:v"));
    }

    #[test]
    fn test_muxer_discard_removes_staging() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip.mp4");
        let s = EncoderSettings::new(&out, 4, 4, FrameRate::FPS_30, VideoCodec::H264);
        let mut muxer = ElementaryStreamMuxer::new(&out);
        muxer.add_track(&TrackFormat::from_settings(&s)).unwrap();
        muxer.start().unwrap();
        muxer
            .write_sample(
                0,
                &EncodedSample {
                    data: vec![0, 0, 0, 1],
                    pts_us: None,
                    key_frame: true,
                },
            )
            .unwrap();
        let staging = dir.path().join("clip.h264.part");
        assert!(staging.exists());
        muxer.discard();
        assert!(!staging.exists());
        assert!(!out.exists());
    }

    #[test]
    fn test_muxer_discard_keeps_file_it_never_wrote() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("clip.mp4");
        std::fs::write(&out, b"earlier render").unwrap();
        let s = EncoderSettings::new(&out, 4, 4, FrameRate::FPS_30, VideoCodec::H264);
        let mut muxer = ElementaryStreamMuxer::new(&out);
        muxer.add_track(&TrackFormat::from_settings(&s)).unwrap();
        muxer.start().unwrap();
        muxer.discard();
        assert_eq!(std::fs::read(&out).unwrap(), b"earlier render");
        assert!(!dir.path().join("clip.h264.part").exists());
    }

    #[test]
    fn test_muxer_rejects_second_track() {
        let s = EncoderSettings::new("x.mp4", 4, 4, FrameRate::FPS_30, VideoCodec::H264);
        let mut muxer = ElementaryStreamMuxer::new("x.mp4");
        let format = TrackFormat::from_settings(&s);
        assert_eq!(muxer.add_track(&format).unwrap(), 0);
        assert!(muxer.add_track(&format).is_err());
    }
}
