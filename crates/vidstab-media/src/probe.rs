//! Media file probing to get metadata without full decode.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;
use vidstab_core::{FrameRate, Result, VidstabError};

/// Information about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    /// File path
    pub path: String,
    /// Duration in seconds, when the container reports it
    pub duration: Option<f64>,
    /// Video streams
    pub video_streams: Vec<VideoStreamInfo>,
    /// Audio streams
    pub audio_streams: Vec<AudioStreamInfo>,
    /// Container format
    pub format: String,
}

/// Information about a video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    /// Coded width, before applying the rotation tag.
    pub width: u32,
    /// Coded height, before applying the rotation tag.
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Clockwise display rotation in degrees: 0, 90, 180 or 270.
    pub rotation_degrees: i32,
    /// Frame count reported by the container.
    pub frame_count: Option<usize>,
}

impl VideoStreamInfo {
    /// Size of the upright frames the decoder delivers.
    pub fn display_size(&self) -> (u32, u32) {
        if self.rotation_degrees == 90 || self.rotation_degrees == 270 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// Information about an audio stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    #[serde(default)]
    tags: Option<FfprobeTags>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

/// Fold any angle into 0..360.
fn normalize_rotation(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

impl FfprobeStream {
    fn rotation_degrees(&self) -> i32 {
        if let Some(rotate) = self
            .tags
            .as_ref()
            .and_then(|t| t.rotate.as_deref())
            .and_then(|r| r.trim().parse::<i32>().ok())
        {
            return normalize_rotation(rotate);
        }
        // display matrix rotation is counter-clockwise
        self.side_data_list
            .iter()
            .find_map(|s| s.rotation)
            .map_or(0, |r| normalize_rotation(-(r.round() as i32)))
    }
}

/// Ensure `ffprobe` is installed.
fn ffprobe_binary() -> Result<std::path::PathBuf> {
    which::which("ffprobe").map_err(|_| {
        VidstabError::SourceUnavailable("ffprobe was not found on PATH".to_string())
    })
}

impl MediaProbe {
    /// Probe a media file.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        if !path.exists() {
            return Err(VidstabError::SourceUnavailable(format!(
                "File not found: {}",
                path_str
            )));
        }

        let ffprobe = ffprobe_binary()?;
        let output = Command::new(ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(VidstabError::SourceUnavailable(format!(
                "ffprobe failed for {}: {}",
                path_str,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Self::from_json(&path_str, &output.stdout)
    }

    /// Parse `ffprobe -print_format json -show_format -show_streams` output.
    pub fn from_json(path: &str, json: &[u8]) -> Result<Self> {
        let probe: FfprobeOutput = serde_json::from_slice(json)
            .map_err(|e| VidstabError::Serialization(format!("ffprobe output: {e}")))?;

        let mut video_streams = Vec::new();
        let mut audio_streams = Vec::new();
        for stream in &probe.streams {
            match stream.codec_type.as_deref() {
                Some("video") => {
                    let frame_rate = stream
                        .avg_frame_rate
                        .as_deref()
                        .and_then(FrameRate::parse)
                        .or_else(|| stream.r_frame_rate.as_deref().and_then(FrameRate::parse))
                        .unwrap_or_default();
                    video_streams.push(VideoStreamInfo {
                        index: stream.index,
                        codec: stream.codec_name.clone().unwrap_or_default(),
                        width: stream.width.unwrap_or(0),
                        height: stream.height.unwrap_or(0),
                        frame_rate,
                        rotation_degrees: stream.rotation_degrees(),
                        frame_count: stream
                            .nb_frames
                            .as_deref()
                            .and_then(|n| n.parse::<usize>().ok())
                            .filter(|&n| n > 0),
                    });
                }
                Some("audio") => audio_streams.push(AudioStreamInfo {
                    index: stream.index,
                    codec: stream.codec_name.clone().unwrap_or_default(),
                    sample_rate: stream
                        .sample_rate
                        .as_deref()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                    channels: stream.channels.unwrap_or(0),
                }),
                _ => {}
            }
        }

        let (format, duration) = match probe.format {
            Some(f) => (
                f.format_name.unwrap_or_default(),
                f.duration.and_then(|d| d.parse::<f64>().ok()),
            ),
            None => (String::new(), None),
        };

        Ok(Self {
            path: path.to_string(),
            duration,
            video_streams,
            audio_streams,
            format,
        })
    }

    /// Check if the file has video.
    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    /// Check if the file has audio.
    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }

    /// Get the primary video stream info.
    pub fn primary_video(&self) -> Option<&VideoStreamInfo> {
        self.video_streams.first()
    }

    /// Get the primary audio stream info.
    pub fn primary_audio(&self) -> Option<&AudioStreamInfo> {
        self.audio_streams.first()
    }
}

/// Count the packets of the first video stream, for containers that do not
/// report a frame count.
pub fn count_video_packets<P: AsRef<Path>>(path: P) -> Result<usize> {
    let path = path.as_ref();
    let ffprobe = ffprobe_binary()?;
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_packets",
            "-show_entries",
            "stream=nb_read_packets",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()?;

    if !output.status.success() {
        return Err(VidstabError::SourceUnavailable(format!(
            "ffprobe could not count packets of {}",
            path.display()
        )));
    }
    let count = parse_packet_count(&String::from_utf8_lossy(&output.stdout));
    debug!(path = %path.display(), count, "counted video packets");
    Ok(count)
}

fn parse_packet_count(output: &str) -> usize {
    output
        .lines()
        .filter_map(|l| l.trim().trim_end_matches(',').parse::<usize>().ok())
        .next()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "nb_frames": "300",
                "side_data_list": [{ "side_data_type": "Display Matrix", "rotation": -90 }]
            },
            {
                "index": 1,
                "codec_type": "audio",
                "codec_name": "aac",
                "sample_rate": "48000",
                "channels": 2
            }
        ],
        "format": { "format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "10.010000" }
    }"#;

    #[test]
    fn test_parse_ffprobe_json() {
        let probe = MediaProbe::from_json("clip.mp4", SAMPLE.as_bytes()).unwrap();
        let video = probe.primary_video().unwrap();
        assert_eq!(video.frame_rate, FrameRate::FPS_29_97);
        assert_eq!(video.rotation_degrees, 90);
        assert_eq!(video.display_size(), (1080, 1920));
        assert_eq!(video.frame_count, Some(300));
        assert!(probe.has_audio());
        assert_eq!(probe.primary_audio().unwrap().sample_rate, 48000);
        assert!((probe.duration.unwrap() - 10.01).abs() < 1e-9);
    }

    #[test]
    fn test_rotate_tag_wins() {
        let json = r#"{"streams":[{"index":0,"codec_type":"video","width":640,"height":480,
            "avg_frame_rate":"0/0","r_frame_rate":"25/1","tags":{"rotate":"180"}}]}"#;
        let probe = MediaProbe::from_json("a.mov", json.as_bytes()).unwrap();
        let video = probe.primary_video().unwrap();
        assert_eq!(video.rotation_degrees, 180);
        assert_eq!(video.frame_rate, FrameRate::FPS_25);
        assert_eq!(video.frame_count, None);
        assert!(!probe.has_audio());
    }

    #[test]
    fn test_bad_json() {
        assert!(MediaProbe::from_json("x", b"not json").is_err());
    }

    #[test]
    fn test_parse_packet_count() {
        assert_eq!(parse_packet_count("241\n"), 241);
        assert_eq!(parse_packet_count("241,\n"), 241);
        assert_eq!(parse_packet_count(""), 0);
    }
}
