use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// On-disk profile for one user: free-form preferences plus everything the
/// loop has recorded across runs. One JSON file per user, never deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionProfile {
    pub user_id: String,
    #[serde(default)]
    pub preferences: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub session_history: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("profile io failed: {0}")]
    Io(#[from] io::Error),
    #[error("profile is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Working transcript plus its persistent backing file.
///
/// `record` only touches memory; `save` folds the recorded-but-unsaved
/// entries into the profile on disk with a whole-file rewrite. A save is
/// O(history length) and no more crash-atomic than the filesystem makes it.
pub struct SessionStore {
    dir: PathBuf,
    user_id: String,
    transcript: Vec<String>,
    unsaved: Vec<String>,
}

impl SessionStore {
    /// Open the profile for `user_id`, creating a fresh empty one in memory
    /// if no file exists yet. The working transcript starts from the
    /// persisted history so earlier runs keep enriching prompts.
    pub fn open(dir: impl Into<PathBuf>, user_id: impl Into<String>) -> Result<Self, SessionError> {
        let dir = dir.into();
        let user_id = user_id.into();
        let profile = load_profile(&profile_path(&dir, &user_id), &user_id)?;
        debug!(user = %user_id, entries = profile.session_history.len(), "session opened");
        Ok(Self {
            dir,
            user_id,
            transcript: profile.session_history,
            unsaved: Vec::new(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The transcript prompts see: persisted history plus everything
    /// recorded during this run.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn record(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        self.transcript.push(entry.clone());
        self.unsaved.push(entry);
    }

    /// Persist unsaved entries. The profile is re-read first so edits made
    /// by other processes since `open` survive the rewrite. Entries stay
    /// queued until a write succeeds.
    pub fn save(&mut self) -> Result<(), SessionError> {
        if self.unsaved.is_empty() {
            return Ok(());
        }

        let path = profile_path(&self.dir, &self.user_id);
        let mut profile = load_profile(&path, &self.user_id)?;
        profile.session_history.extend_from_slice(&self.unsaved);

        fs::create_dir_all(&self.dir)?;
        let file = fs::File::create(&path)?;
        let mut writer = io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &profile)?;
        writer.flush()?;
        // Only a completed write consumes the backlog; a failed attempt
        // keeps it for the next save.
        self.unsaved.clear();
        debug!(path = %path.display(), entries = profile.session_history.len(), "profile saved");
        Ok(())
    }

    /// Drop the in-memory working view, recorded-but-unsaved entries
    /// included. The on-disk profile is untouched.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.unsaved.clear();
    }
}

fn profile_path(dir: &Path, user_id: &str) -> PathBuf {
    dir.join(format!("{user_id}.json"))
}

fn load_profile(path: &Path, user_id: &str) -> Result<SessionProfile, SessionError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SessionProfile {
            user_id: user_id.to_string(),
            ..SessionProfile::default()
        }),
        Err(e) => Err(e.into()),
    }
}
