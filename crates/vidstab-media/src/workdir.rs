//! Working directory for intermediate renders.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use vidstab_core::Result;

const APP_DIR: &str = "vidstab";

/// Directory holding intermediate files of running jobs.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// `<cache dir>/vidstab`, or `<temp dir>/vidstab` without a cache dir.
    pub fn default_location() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
    }

    /// Open the default working directory, creating it if needed.
    pub fn open() -> Result<Self> {
        Self::at(Self::default_location())
    }

    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "work dir ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh, not yet existing file path: `<prefix>-<uuid>.<extension>`.
    pub fn temp_file(&self, prefix: &str, extension: &str) -> PathBuf {
        self.root
            .join(format!("{prefix}-{}.{extension}", Uuid::new_v4()))
    }

    /// Remove every intermediate file left behind by earlier runs.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("could not remove {}: {e}", path.display()),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_files_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::at(dir.path().join("work")).unwrap();
        assert!(work.root().is_dir());
        let a = work.temp_file("stab", "mp4");
        let b = work.temp_file("stab", "mp4");
        assert_ne!(a, b);
        assert!(a.starts_with(work.root()));
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("stab-") && name.ends_with(".mp4"));
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::at(dir.path()).unwrap();
        std::fs::write(work.temp_file("stab", "mp4"), b"x").unwrap();
        std::fs::write(work.temp_file("stab", "mp4"), b"y").unwrap();
        assert_eq!(work.clear().unwrap(), 2);
    }

    #[test]
    fn test_default_location_is_named() {
        assert!(WorkDir::default_location().ends_with("vidstab"));
    }
}
