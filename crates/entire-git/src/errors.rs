#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("not inside a git repository")]
    NotInRepository,

    #[error("repository not found at {path}")]
    RepositoryNotFound { path: String },

    #[error("shadow branch '{refname}' not found")]
    ShadowNotFound { refname: String },

    #[error("base commit '{oid}' not found")]
    BaseCommitNotFound { oid: String },

    #[error("object store locked by another process after {attempts} attempts")]
    ObjectStoreBusy { attempts: u32 },

    #[error("object store operation failed: {message}")]
    ObjectStoreIo { message: String },

    #[error("invalid path: {path}: {message}")]
    InvalidPath { path: String, message: String },

    #[error(transparent)]
    Git2(#[from] git2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
