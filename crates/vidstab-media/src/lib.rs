//! VidStab Media - FFmpeg integration for frame I/O
//!
//! This crate handles:
//! - Restartable frame sources (video files, image sequences, memory)
//! - Media file probing
//! - Encoding and muxing behind substitutable backends
//! - Merging the original audio back into a render
//! - Working-directory temp files

pub mod encoder;
pub mod ffmpeg_backend;
pub mod image_source;
pub mod merge;
pub mod probe;
pub mod source;
pub mod video_source;
pub mod workdir;

pub use encoder::{
    ContainerWriter, EncodedSample, EncoderBackend, EncoderOutput, EncoderProvider,
    EncoderSettings, EncoderState, MemoryBackend, MemoryContainer, MemoryEncoderProvider,
    TrackFormat, VideoCodec, VideoEncoder,
};
pub use ffmpeg_backend::{ElementaryStreamMuxer, FfmpegBackend, FfmpegEncoderProvider};
pub use image_source::ImageSequenceSource;
pub use merge::merge_tracks;
pub use probe::MediaProbe;
pub use source::{FrameSource, FrameVisitor, MemorySource};
pub use video_source::VideoFileSource;
pub use workdir::WorkDir;

/// Check that the external FFmpeg tools are usable.
pub fn init() -> bool {
    let available = ffmpeg_sidecar::command::ffmpeg_is_installed();
    if available {
        tracing::info!("VidStab Media initialized");
    } else {
        tracing::warn!("ffmpeg was not found; video files cannot be read or written");
    }
    available
}
