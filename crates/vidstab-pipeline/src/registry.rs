//! Guard against two jobs touching the same files.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use vidstab_core::{Result, VidstabError};

type JobKey = (PathBuf, PathBuf);

/// Set of `(source, output)` pairs with a running job.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    active: Arc<Mutex<HashSet<JobKey>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `source` and `output`. Fails with `JobBusy` when a running job
    /// reads the same source or writes the same output.
    pub fn acquire(&self, source: &Path, output: &Path) -> Result<JobLease> {
        let mut active = self.active.lock();
        if let Some((busy_source, busy_output)) = active
            .iter()
            .find(|(s, o)| s.as_path() == source || o.as_path() == output)
        {
            let busy = if busy_source.as_path() == source {
                busy_source
            } else {
                busy_output
            };
            return Err(VidstabError::JobBusy(busy.display().to_string()));
        }
        let key = (source.to_path_buf(), output.to_path_buf());
        active.insert(key.clone());
        debug!(source = %source.display(), output = %output.display(), "job registered");
        Ok(JobLease {
            registry: self.clone(),
            key: Some(key),
        })
    }

    pub fn is_active(&self, source: &Path, output: &Path) -> bool {
        self.active
            .lock()
            .contains(&(source.to_path_buf(), output.to_path_buf()))
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

/// Registration of one running job, released on drop.
#[derive(Debug)]
pub struct JobLease {
    registry: JobRegistry,
    key: Option<JobKey>,
}

impl Drop for JobLease {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.registry.active.lock().remove(&key);
        }
    }
}
