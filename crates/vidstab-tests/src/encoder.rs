//! Encoder lifecycle seen from the pipeline side.

use vidstab_core::{FrameBuffer, FrameRate, PixelFormat, VidstabError};
use vidstab_media::{
    EncoderOutput, EncoderProvider, EncoderSettings, EncoderState, MemoryBackend,
    MemoryEncoderProvider, TrackFormat, VideoCodec,
};

fn settings() -> EncoderSettings {
    EncoderSettings::new("memory.mp4", 8, 6, FrameRate::FPS_25, VideoCodec::H264)
}

fn frame() -> FrameBuffer {
    FrameBuffer::new(8, 6, PixelFormat::Rgb8)
}

#[test]
fn write_after_release_does_not_reach_the_container() {
    let provider = MemoryEncoderProvider::new();
    let mut encoder = provider.create(settings()).unwrap();
    encoder.write(&frame()).unwrap();
    encoder.write(&frame()).unwrap();
    encoder.release().unwrap();
    assert_eq!(encoder.state(), EncoderState::Closed);

    assert!(encoder.write(&frame()).is_ok());
    assert_eq!(provider.container.snapshot().samples.len(), 2);
    assert_eq!(provider.backend.snapshot().queued_pts, vec![0, 40_000]);
}

#[test]
fn track_is_added_once_and_started_once() {
    let provider = MemoryEncoderProvider::new();
    let mut encoder = provider.create(settings()).unwrap();
    for _ in 0..5 {
        encoder.write(&frame()).unwrap();
    }
    encoder.release().unwrap();
    let rec = provider.container.snapshot();
    assert_eq!(rec.tracks.len(), 1);
    assert_eq!(
        rec.tracks[0],
        TrackFormat {
            codec: VideoCodec::H264,
            width: 8,
            height: 6,
            frame_rate: FrameRate::FPS_25,
        }
    );
    // first sample of each group of pictures is a key frame
    assert!(rec.samples[0].1.key_frame);
    assert!(!rec.samples[1].1.key_frame);
}

#[test]
fn late_format_change_fails_the_write() {
    let backend = MemoryBackend::new();
    let provider = MemoryEncoderProvider {
        backend: backend.clone(),
        ..MemoryEncoderProvider::new()
    };
    let mut encoder = provider.create(settings()).unwrap();
    encoder.write(&frame()).unwrap();
    backend.inject(EncoderOutput::FormatChanged(TrackFormat::from_settings(&settings())));
    assert!(matches!(
        encoder.write(&frame()),
        Err(VidstabError::Muxer(_))
    ));
    encoder.abort();
    assert!(provider.container.snapshot().discarded);
}

#[test]
fn unavailable_codec_is_an_open_error() {
    let provider = MemoryEncoderProvider {
        backend: MemoryBackend::failing(),
        ..MemoryEncoderProvider::new()
    };
    assert!(matches!(
        provider.create(settings()),
        Err(VidstabError::EncoderOpen(_))
    ));
}
