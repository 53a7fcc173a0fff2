//! Identifiers and filesystem layout shared by every other `entire-*`
//! crate: session IDs, checkpoint IDs, shadow branch naming, and the
//! path builder rooted at a repository's Git common directory.

mod ids;
mod layout;
mod shadow;

pub use ids::{CheckpointId, IdError, SessionId, WorktreeId};
pub use layout::{EntirePaths, PathError};
pub use shadow::{ShadowKind, ShadowRefName, CHECKPOINTS_INDEX_REF, SHADOW_REF_PREFIX};
