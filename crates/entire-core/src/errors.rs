#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid session id: {0}")]
    InvalidSessionId(#[from] entire_paths::IdError),

    #[error("session state store I/O failed: {message}")]
    StateStoreIo { message: String },

    #[error(transparent)]
    Path(#[from] entire_paths::PathError),

    /// Covers the object store's own `ObjectStoreBusy`/`ObjectStoreIo`
    /// variants after the retry budget in `entire-git` is exhausted.
    #[error(transparent)]
    Git(#[from] entire_git::GitError),

    #[error(transparent)]
    Git2(#[from] git2::Error),

    #[error("failed to parse transcript: {0}")]
    TranscriptParse(#[from] entire_protocol::DecodeError),

    #[error("checkpoint id '{id}' already exists with different content")]
    CheckpointCollision { id: String },

    #[error("rewind target '{checkpoint_id}' not found for session '{session_id}'")]
    RewindTargetMissing {
        session_id: String,
        checkpoint_id: String,
    },

    #[error("no active session '{0}'")]
    SessionNotFound(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
