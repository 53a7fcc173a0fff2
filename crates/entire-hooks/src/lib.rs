//! Shared plumbing for the hook binaries: logging setup, hook script
//! installation, and repository/paths resolution.

pub mod installer;
pub mod logging;
pub mod trailer;

use std::path::PathBuf;

use entire_paths::EntirePaths;
use git2::Repository;

/// Open the repository the current process is running inside (as a Git
/// hook always is) and build its `EntirePaths`.
///
/// Hooks must never fail the user's Git operation because our own state
/// is unreachable, so callers treat `Err` here as "log and exit 0", never
/// as a reason to reject the commit/push.
pub fn open_current_repo() -> Result<(Repository, EntirePaths), git2::Error> {
    let repo = Repository::discover(".")?;
    let common_dir = repo.commondir().to_path_buf();
    Ok((repo, EntirePaths::from_git_common_dir(common_dir)))
}

pub fn current_worktree_id(repo: &Repository) -> entire_paths::WorktreeId {
    if repo.commondir() == repo.path() {
        return entire_paths::WorktreeId::new("");
    }
    let id: PathBuf = repo.path().to_path_buf();
    entire_paths::WorktreeId::new(id.to_string_lossy().into_owned())
}

/// `prepare-commit-msg`'s `source` argument: empty, or one of `message`,
/// `template`, `merge`, `squash`, `commit`. `commit` means this invocation
/// is `git commit --amend` (or `-c`/`--reedit-message`) replaying a prior
/// commit's message.
pub fn is_amend_source(source: Option<&str>) -> bool {
    source == Some("commit")
}

/// `GIT_REFLOG_ACTION` is the only amend signal `post-commit` gets, since
/// it runs with no argv at all.
pub fn is_amend_invocation() -> bool {
    std::env::var("GIT_REFLOG_ACTION")
        .map(|v| v.starts_with("commit (amend"))
        .unwrap_or(false)
}
