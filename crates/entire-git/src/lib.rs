//! Shadow branch snapshotting and working-tree queries: the Git-facing
//! layer the checkpoint engine builds on. Owns the shadow ref naming
//! scheme and the tree-building/restoring logic so `entire-core` only
//! ever reasons about commits and trees it already holds.

mod errors;
mod metadata;
mod shadow;
mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use errors::GitError;
pub use metadata::{commit_checkpoint_blobs, read_checkpoint_blob, CheckpointBlob};
pub use shadow::{
    delete_shadow, find_shadow_for_base, list_shadow_branches, migrate_shadow, read_tree_file,
    reset_shadow_to_base, restore_workdir_from_tree, snapshot_worktree_to_shadow,
};
pub use status::{
    count_unpushed_commits, current_branch_name, files_changed_since, has_uncommitted_changes,
    staged_files,
};
