//! File-backed task state storage.
//!
//! Each task id gets one YAML file under the store directory. File names
//! are a hash of the task id so arbitrary ids are safe on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use super::TaskState;
use crate::error::{Result, WaitError};

/// On-disk envelope around a [`TaskState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateFile {
    /// Schema version for migration.
    version: u32,
    /// Task the state belongs to.
    task_id: String,
    /// When the state was last written.
    updated_at: DateTime<Utc>,
    /// The persisted progress.
    #[serde(default)]
    state: TaskState,
}

/// Persistent store for task state between invocations.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the store directory.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Get the state file path for a task.
    pub fn state_file(&self, task_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(task_id.as_bytes());
        let hash = hex::encode(&hasher.finalize()[..8]);
        self.dir.join(format!("{}.yml", hash))
    }

    /// Load state for a task, or an empty state if none was saved.
    pub fn load(&self, task_id: &str) -> Result<TaskState> {
        let path = self.state_file(task_id);

        if !path.exists() {
            return Ok(TaskState::new());
        }

        let content = fs::read_to_string(&path)?;
        let file: StateFile = serde_yaml::from_str(&content).map_err(|e| WaitError::StateCorrupted {
            message: format!("{}: {}", path.display(), e),
        })?;

        if file.version != Self::CURRENT_VERSION {
            return Err(WaitError::StateCorrupted {
                message: format!(
                    "{}: unsupported state version {}",
                    path.display(),
                    file.version
                ),
            });
        }
        if file.task_id != task_id {
            return Err(WaitError::StateCorrupted {
                message: format!(
                    "{}: belongs to task '{}', not '{}'",
                    path.display(),
                    file.task_id,
                    task_id
                ),
            });
        }

        Ok(file.state)
    }

    /// Save state for a task using atomic write.
    ///
    /// Writes to a temp file and renames it over the target, so a crash
    /// mid-write leaves the previous state intact.
    pub fn save(&self, task_id: &str, state: &TaskState) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let file = StateFile {
            version: Self::CURRENT_VERSION,
            task_id: task_id.to_string(),
            updated_at: Utc::now(),
            state: state.clone(),
        };
        let content = serde_yaml::to_string(&file).map_err(|e| WaitError::StateCorrupted {
            message: format!("Failed to serialize state: {}", e),
        })?;

        let path = self.state_file(task_id);
        let temp_path = path.with_extension("yml.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &path)?;

        debug!("Saved state for task '{}' to {}", task_id, path.display());
        Ok(())
    }

    /// Remove saved state for a task. Missing state is not an error.
    pub fn clear(&self, task_id: &str) -> Result<()> {
        let path = self.state_file(task_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
