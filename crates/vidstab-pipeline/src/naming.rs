//! Output file naming.

use std::path::{Path, PathBuf};
use vidstab_core::{Result, VidstabError};

/// Extension of every rendered file.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Highest numeric suffix tried before giving up.
pub const MAX_SUFFIX: u32 = 998;

/// Candidate name for attempt `counter`: `name.mp4`, then `name_001.mp4`...
pub fn candidate_name(name: &str, counter: u32) -> String {
    if counter == 0 {
        format!("{name}.{OUTPUT_EXTENSION}")
    } else {
        format!("{name}_{counter:03}.{OUTPUT_EXTENSION}")
    }
}

/// First path in `dir` named after `name` that does not exist yet.
pub fn unique_output_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let name = if name.is_empty() { "unknown" } else { name };
    (0..=MAX_SUFFIX)
        .map(|counter| dir.join(candidate_name(name, counter)))
        .find(|path| !path.exists())
        .ok_or_else(|| {
            VidstabError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("no free output name for '{name}' in {}", dir.display()),
            ))
        })
}
