//! Combining the rendered video with the audio of the original.

use ffmpeg_sidecar::command::ffmpeg_is_installed;
use ffmpeg_sidecar::paths::ffmpeg_path;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};
use vidstab_core::{Result, VidstabError};

/// Arguments that take the video of `video_only` and every audio track of
/// `original`, both by stream copy.
pub fn merge_args(output: &Path, video_only: &Path, original: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        video_only.to_string_lossy().into_owned(),
        "-i".into(),
        original.to_string_lossy().into_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a?".into(),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Write `output` from the video track of `video_only` and the audio tracks
/// of `original`. Each input keeps its own timestamps.
pub fn merge_tracks(output: &Path, video_only: &Path, original: &Path) -> Result<()> {
    if !video_only.exists() {
        return Err(VidstabError::Muxer(format!(
            "rendered video {} is missing",
            video_only.display()
        )));
    }
    if !ffmpeg_is_installed() {
        return Err(VidstabError::Muxer(
            "ffmpeg is required to merge audio, but was not found".to_string(),
        ));
    }

    let args = merge_args(output, video_only, original);
    debug!(?args, "merging audio");
    let result = Command::new(ffmpeg_path())
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| VidstabError::Muxer(format!("Failed to spawn ffmpeg: {e}")))?;

    if !result.status.success() {
        // do not leave a half-written file behind
        let _ = std::fs::remove_file(output);
        return Err(VidstabError::Muxer(format!(
            "audio merge into {} failed: {}",
            output.display(),
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }
    info!("Merged audio of {} into {}", original.display(), output.display());
    Ok(())
}
