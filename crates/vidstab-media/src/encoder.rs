//! Video encoding state machine over a pluggable codec backend and container.
//!
//! The encoder owns two seams: an [`EncoderBackend`] that turns raw frames into
//! compressed output, and a [`ContainerWriter`] that muxes that output into a
//! file. The drain loop between them is the only place that blocks.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vidstab_core::{FrameBuffer, FrameRate, Result, VidstabError};

/// Longest a single dequeue may block while frames are still being written.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Bits per second per pixel of output.
pub const BITS_PER_PIXEL: u64 = 5;

/// Seconds between key frames.
pub const KEY_FRAME_INTERVAL_SECS: u32 = 5;

/// Video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    #[default]
    H265,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
        }
    }

    /// FFmpeg muxer name of the raw Annex-B stream.
    pub fn elementary_format(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "hevc",
        }
    }

    /// Sample entry tag forced in MP4 so that players recognize the track.
    pub fn mp4_tag(self) -> Option<&'static str> {
        match self {
            Self::H264 => None,
            Self::H265 => Some("hvc1"),
        }
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = VidstabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::H265),
            other => Err(VidstabError::InvalidParameter(format!(
                "unknown codec '{other}'"
            ))),
        }
    }
}

/// Encoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub codec: VideoCodec,
    /// Bits per second.
    pub bit_rate: u64,
    pub key_frame_interval_secs: u32,
}

impl EncoderSettings {
    pub fn new(
        output_path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        frame_rate: FrameRate,
        codec: VideoCodec,
    ) -> Self {
        Self {
            output_path: output_path.into(),
            width,
            height,
            frame_rate,
            codec,
            bit_rate: width as u64 * height as u64 * BITS_PER_PIXEL,
            key_frame_interval_secs: KEY_FRAME_INTERVAL_SECS,
        }
    }

    /// Group of pictures length in frames.
    pub fn key_frame_interval_frames(&self) -> u32 {
        self.frame_rate.rounded_fps() * self.key_frame_interval_secs.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VidstabError::InvalidParameter(format!(
                "output size {}x{} is empty",
                self.width, self.height
            )));
        }
        if !self.frame_rate.is_valid() {
            return Err(VidstabError::InvalidParameter(
                "output frame rate must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Format of the single video track, announced once by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFormat {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

impl TrackFormat {
    pub fn from_settings(settings: &EncoderSettings) -> Self {
        Self {
            codec: settings.codec,
            width: settings.width,
            height: settings.height,
            frame_rate: settings.frame_rate,
        }
    }
}

/// A piece of compressed output.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSample {
    pub data: Vec<u8>,
    /// Presentation time of the frame, when the backend emits whole frames.
    pub pts_us: Option<i64>,
    pub key_frame: bool,
}

/// Result of one dequeue from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderOutput {
    FormatChanged(TrackFormat),
    Sample(EncodedSample),
    TryAgainLater,
    EndOfStream,
}

/// Compresses raw frames.
pub trait EncoderBackend: Send {
    fn configure(&mut self, settings: &EncoderSettings) -> Result<()>;
    fn queue_frame(&mut self, frame: &FrameBuffer, pts_us: i64) -> Result<()>;
    /// Wait at most `timeout` for the next output.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderOutput>;
    fn signal_end_of_stream(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;
    /// Tear down immediately, dropping pending output.
    fn abort(&mut self);
}

/// Muxes compressed output into a file.
pub trait ContainerWriter: Send {
    fn add_track(&mut self, format: &TrackFormat) -> Result<usize>;
    fn start(&mut self) -> Result<()>;
    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;
    /// Tear down and delete whatever was written.
    fn discard(&mut self);
}

/// Lifecycle of a [`VideoEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Created,
    Opened,
    Writing,
    Finalizing,
    Closed,
}

/// Frame-by-frame encoder writing a single-track video file.
pub struct VideoEncoder {
    backend: Box<dyn EncoderBackend>,
    container: Box<dyn ContainerWriter>,
    settings: Option<EncoderSettings>,
    state: EncoderState,
    track: Option<usize>,
    frames_written: u64,
}

impl VideoEncoder {
    pub fn new(backend: Box<dyn EncoderBackend>, container: Box<dyn ContainerWriter>) -> Self {
        Self {
            backend,
            container,
            settings: None,
            state: EncoderState::Created,
            track: None,
            frames_written: 0,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn settings(&self) -> Option<&EncoderSettings> {
        self.settings.as_ref()
    }

    pub fn open(&mut self, settings: EncoderSettings) -> Result<()> {
        if self.state != EncoderState::Created {
            return Err(VidstabError::InvalidParameter(format!(
                "encoder cannot be opened in state {:?}",
                self.state
            )));
        }
        settings.validate()?;
        if let Err(e) = self.backend.configure(&settings) {
            self.backend.abort();
            self.container.discard();
            self.state = EncoderState::Closed;
            return Err(match e {
                VidstabError::EncoderOpen(_) => e,
                other => VidstabError::EncoderOpen(other.to_string()),
            });
        }
        info!(
            "Encoder opened: {}x{} {} {:?} at {} bps",
            settings.width, settings.height, settings.frame_rate, settings.codec, settings.bit_rate
        );
        self.settings = Some(settings);
        self.state = EncoderState::Opened;
        Ok(())
    }

    /// Encode the next frame. A no-op once the encoder is closed.
    pub fn write(&mut self, frame: &FrameBuffer) -> Result<()> {
        let rate = match (self.state, &self.settings) {
            (EncoderState::Closed, _) => return Ok(()),
            (EncoderState::Opened | EncoderState::Writing, Some(settings)) => settings.frame_rate,
            (state, _) => {
                return Err(VidstabError::InvalidParameter(format!(
                    "cannot write frames in state {state:?}"
                )))
            }
        };
        self.state = EncoderState::Writing;
        let pts = rate.frame_to_micros(self.frames_written);
        self.backend.queue_frame(frame, pts)?;
        self.frames_written += 1;
        self.drain(false)
    }

    /// Flush everything and close the file. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        match self.state {
            EncoderState::Closed => return Ok(()),
            EncoderState::Created => {
                self.container.discard();
                self.state = EncoderState::Closed;
                return Ok(());
            }
            _ => {}
        }
        self.state = EncoderState::Finalizing;
        let result = self.finalize();
        if let Err(e) = &result {
            warn!("encoder finalization failed: {e}");
            self.backend.abort();
            self.container.discard();
        }
        self.state = EncoderState::Closed;
        result
    }

    /// Tear down without draining and delete the partial output.
    pub fn abort(&mut self) {
        if self.state == EncoderState::Closed {
            return;
        }
        debug!(frames = self.frames_written, "aborting encoder");
        self.backend.abort();
        self.container.discard();
        self.state = EncoderState::Closed;
    }

    fn finalize(&mut self) -> Result<()> {
        self.backend.signal_end_of_stream()?;
        self.drain(true)?;
        self.backend.release()?;
        if self.track.is_none() {
            return Err(VidstabError::Muxer(
                "stream ended before any output format was known".to_string(),
            ));
        }
        self.container.stop()?;
        self.container.release()?;
        info!("Encoder closed after {} frames", self.frames_written);
        Ok(())
    }

    /// Move backend output into the container. Without `until_end` the loop
    /// returns as soon as the backend has nothing ready.
    fn drain(&mut self, until_end: bool) -> Result<()> {
        loop {
            match self.backend.dequeue_output(DRAIN_TIMEOUT)? {
                EncoderOutput::TryAgainLater => {
                    if !until_end {
                        return Ok(());
                    }
                }
                EncoderOutput::FormatChanged(format) => {
                    if self.track.is_some() {
                        return Err(VidstabError::Muxer(
                            "output format changed twice".to_string(),
                        ));
                    }
                    let track = self.container.add_track(&format)?;
                    self.container.start()?;
                    debug!(track, ?format, "container started");
                    self.track = Some(track);
                }
                EncoderOutput::Sample(sample) => {
                    let Some(track) = self.track else {
                        return Err(VidstabError::Muxer(
                            "sample received before the output format".to_string(),
                        ));
                    };
                    self.container.write_sample(track, &sample)?;
                }
                EncoderOutput::EndOfStream => return Ok(()),
            }
        }
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        if self.state != EncoderState::Closed {
            self.abort();
        }
    }
}

/// Creates encoders for a job.
pub trait EncoderProvider: Send + Sync {
    fn create(&self, settings: EncoderSettings) -> Result<VideoEncoder>;
}

// ── In-memory seams ─────────────────────────────────────────────

/// What a [`MemoryBackend`] has been asked to do.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackendState {
    pub settings: Option<EncoderSettings>,
    pub queued_pts: Vec<i64>,
    pub end_of_stream: bool,
    pub released: bool,
    pub aborted: bool,
    pending: VecDeque<EncoderOutput>,
    format_sent: bool,
}

/// Backend emitting every frame verbatim as one sample.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryBackendState>>,
    fail_configure: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose `configure` fails, as a missing codec would.
    pub fn failing() -> Self {
        Self {
            fail_configure: true,
            ..Self::default()
        }
    }

    /// Append an output to be returned before the regular ones.
    pub fn inject(&self, output: EncoderOutput) {
        self.state.lock().pending.push_back(output);
    }

    pub fn snapshot(&self) -> MemoryBackendState {
        self.state.lock().clone()
    }
}

impl EncoderBackend for MemoryBackend {
    fn configure(&mut self, settings: &EncoderSettings) -> Result<()> {
        if self.fail_configure {
            return Err(VidstabError::EncoderOpen(format!(
                "no {:?} encoder available",
                settings.codec
            )));
        }
        // every encoder session starts from a clean slate
        let mut state = self.state.lock();
        *state = MemoryBackendState {
            settings: Some(settings.clone()),
            ..MemoryBackendState::default()
        };
        Ok(())
    }

    fn queue_frame(&mut self, frame: &FrameBuffer, pts_us: i64) -> Result<()> {
        let mut state = self.state.lock();
        let Some(settings) = state.settings.clone() else {
            return Err(VidstabError::InvalidParameter(
                "backend not configured".to_string(),
            ));
        };
        if !state.format_sent {
            state.format_sent = true;
            state
                .pending
                .push_back(EncoderOutput::FormatChanged(TrackFormat::from_settings(&settings)));
        }
        let gop = settings.key_frame_interval_frames() as usize;
        let key_frame = state.queued_pts.len() % gop.max(1) == 0;
        state.queued_pts.push(pts_us);
        state.pending.push_back(EncoderOutput::Sample(EncodedSample {
            data: frame.data.clone(),
            pts_us: Some(pts_us),
            key_frame,
        }));
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<EncoderOutput> {
        let mut state = self.state.lock();
        if let Some(output) = state.pending.pop_front() {
            return Ok(output);
        }
        Ok(if state.end_of_stream {
            EncoderOutput::EndOfStream
        } else {
            EncoderOutput::TryAgainLater
        })
    }

    fn signal_end_of_stream(&mut self) -> Result<()> {
        self.state.lock().end_of_stream = true;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.state.lock().released = true;
        Ok(())
    }

    fn abort(&mut self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.aborted = true;
    }
}

/// Everything a [`MemoryContainer`] received.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecording {
    pub tracks: Vec<TrackFormat>,
    pub samples: Vec<(usize, EncodedSample)>,
    pub started: bool,
    pub stopped: bool,
    pub released: bool,
    pub discarded: bool,
}

/// Container keeping samples in memory; clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    recording: Arc<Mutex<MemoryRecording>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MemoryRecording {
        self.recording.lock().clone()
    }

    /// Forget the previous recording before a new encoder writes into it.
    pub fn reset(&self) {
        *self.recording.lock() = MemoryRecording::default();
    }

    /// Frames received, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.recording
            .lock()
            .samples
            .iter()
            .map(|(_, s)| s.data.clone())
            .collect()
    }
}

impl ContainerWriter for MemoryContainer {
    fn add_track(&mut self, format: &TrackFormat) -> Result<usize> {
        let mut rec = self.recording.lock();
        if rec.started {
            return Err(VidstabError::Muxer("container already started".to_string()));
        }
        rec.tracks.push(format.clone());
        Ok(rec.tracks.len() - 1)
    }

    fn start(&mut self) -> Result<()> {
        self.recording.lock().started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> Result<()> {
        let mut rec = self.recording.lock();
        if !rec.started || track >= rec.tracks.len() {
            return Err(VidstabError::Muxer(format!("track {track} is not writable")));
        }
        rec.samples.push((track, sample.clone()));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.recording.lock().stopped = true;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.recording.lock().released = true;
        Ok(())
    }

    fn discard(&mut self) {
        let mut rec = self.recording.lock();
        rec.samples.clear();
        rec.discarded = true;
    }
}

/// Provider handing out encoders that record into one shared
/// [`MemoryContainer`], which holds the most recent encoder's output.
#[derive(Debug, Clone, Default)]
pub struct MemoryEncoderProvider {
    pub backend: MemoryBackend,
    pub container: MemoryContainer,
}

impl MemoryEncoderProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EncoderProvider for MemoryEncoderProvider {
    fn create(&self, settings: EncoderSettings) -> Result<VideoEncoder> {
        self.container.reset();
        let mut encoder = VideoEncoder::new(
            Box::new(self.backend.clone()),
            Box::new(self.container.clone()),
        );
        encoder.open(settings)?;
        Ok(encoder)
    }
}
