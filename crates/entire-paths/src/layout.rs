//! Filesystem layout for session state.
//!
//! Everything this crate writes lives under the repository's Git common
//! directory (`.git`, or the shared `.git` of the main checkout when
//! called from a linked worktree), so every worktree of a repo shares one
//! session store. Condensed checkpoint metadata does not live on the
//! filesystem at all; it is committed onto the `entire/checkpoints/v1` ref
//! (see `entire_git::commit_checkpoint_blobs`) so it travels with the
//! repository's own history.

use std::path::{Path, PathBuf};

use crate::ids::SessionId;

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("invalid session id: {0}")]
    InvalidSessionId(#[from] crate::ids::IdError),
}

/// Path builder rooted at a repository's Git common directory.
#[derive(Debug, Clone)]
pub struct EntirePaths {
    git_common_dir: PathBuf,
}

impl EntirePaths {
    /// Build paths rooted at an already-resolved Git common directory
    /// (typically `git2::Repository::commondir()`).
    pub fn from_git_common_dir(git_common_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_common_dir: git_common_dir.into(),
        }
    }

    pub fn git_common_dir(&self) -> &Path {
        &self.git_common_dir
    }

    /// Directory holding one state file per live session.
    pub fn sessions_dir(&self) -> PathBuf {
        self.git_common_dir.join("entire").join("sessions")
    }

    /// Atomic-write state file for a single session.
    pub fn session_file(&self, id: &SessionId) -> Result<PathBuf, PathError> {
        id.validate()?;
        Ok(self.sessions_dir().join(format!("{id}.json")))
    }

    /// Directory where the daemon-free lock files guarding object-store
    /// writes live (see the `ObjectStoreBusy` retry policy).
    pub fn locks_dir(&self) -> PathBuf {
        self.git_common_dir.join("entire").join("locks")
    }

    pub fn shadow_write_lock_file(&self) -> PathBuf {
        self.locks_dir().join("shadow-write.lock")
    }
}
