//! Working-tree and history queries used to decide when a checkpoint is
//! safe to condense or rewind: uncommitted changes, current branch, and
//! unpushed commit counts.
//!
//! These mirror the conservative-fallback philosophy the hooks rely on:
//! when a status check itself fails, assume the unsafe state rather than
//! erroring out and blocking the user's Git operation.

use git2::{Oid, Repository, Status};

use crate::errors::GitError;

/// Returns `true` if the worktree has any staged or unstaged changes
/// relative to `HEAD`. On failure to compute status, conservatively
/// returns `true` (dirty) rather than propagating the error, since this
/// feeds hook decisions that must never fail the user's Git operation.
pub fn has_uncommitted_changes(repo: &Repository) -> bool {
    let mut opts = git2::StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);

    let statuses = match repo.statuses(Some(&mut opts)) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(
                event = "git.status.check_failed",
                error = %e,
                "assuming dirty worktree after status check failure"
            );
            return true;
        }
    };

    let dirty_mask = Status::INDEX_NEW
        | Status::INDEX_MODIFIED
        | Status::INDEX_DELETED
        | Status::INDEX_RENAMED
        | Status::INDEX_TYPECHANGE
        | Status::WT_NEW
        | Status::WT_MODIFIED
        | Status::WT_DELETED
        | Status::WT_TYPECHANGE
        | Status::WT_RENAMED;

    statuses
        .iter()
        .any(|entry| entry.status().intersects(dirty_mask))
}

pub fn current_branch_name(repo: &Repository) -> Result<Option<String>, GitError> {
    let head = match repo.head() {
        Ok(h) => h,
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
        Err(e) => return Err(GitError::Git2(e)),
    };
    if !head.is_branch() {
        return Ok(None);
    }
    Ok(head.shorthand().map(str::to_string))
}

/// Count commits reachable from `HEAD` but not from its upstream. Returns
/// `(0, false)` when there is no upstream to compare against, and `(0,
/// true)` (conservatively "unknown, assume unpushed work exists") if the
/// revwalk itself fails.
pub fn count_unpushed_commits(repo: &Repository) -> (usize, bool) {
    let head_ref = match repo.head() {
        Ok(r) => r,
        Err(_) => return (0, false),
    };
    let Some(branch_name) = head_ref.shorthand() else {
        return (0, false);
    };
    let local_branch = match repo.find_branch(branch_name, git2::BranchType::Local) {
        Ok(b) => b,
        Err(_) => return (0, false),
    };
    let upstream = match local_branch.upstream() {
        Ok(u) => u,
        Err(_) => return (0, false),
    };

    let (Some(head_oid), Some(upstream_oid)) = (
        head_ref.target(),
        upstream.get().target(),
    ) else {
        return (0, false);
    };

    let mut walk = match repo.revwalk() {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(event = "git.status.revwalk_failed", error = %e, "assuming unpushed work");
            return (0, true);
        }
    };
    if walk.push(head_oid).is_err() || walk.hide(upstream_oid).is_err() {
        return (0, true);
    }

    (walk.count(), false)
}

/// File paths staged relative to `HEAD`, i.e. what a commit landing right
/// now would actually contain. Used to decide whether a commit overlaps an
/// active, not-yet-ended session's modified files.
pub fn staged_files(repo: &Repository) -> Result<Vec<String>, GitError> {
    let head_tree = match repo.head().and_then(|h| h.peel_to_tree()) {
        Ok(t) => Some(t),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
        Err(e) => return Err(GitError::Git2(e)),
    };
    let diff = repo.diff_tree_to_index(head_tree.as_ref(), None, None)?;
    collect_changed_paths(&diff)
}

/// File paths that differ between `base_commit`'s tree and the current
/// working tree, including uncommitted and unstaged changes. Used to
/// project whether an active turn with no shadow snapshot yet has already
/// touched a file a new commit is staging.
pub fn files_changed_since(repo: &Repository, base_commit: Oid) -> Result<Vec<String>, GitError> {
    let commit = repo
        .find_commit(base_commit)
        .map_err(|_| GitError::BaseCommitNotFound {
            oid: base_commit.to_string(),
        })?;
    let tree = commit.tree()?;
    let diff = repo.diff_tree_to_workdir_with_index(Some(&tree), None)?;
    collect_changed_paths(&diff)
}

fn collect_changed_paths(diff: &git2::Diff) -> Result<Vec<String>, GitError> {
    let mut files = Vec::new();
    diff.foreach(
        &mut |delta, _progress| {
            if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                files.push(path.to_string_lossy().into_owned());
            }
            true
        },
        None,
        None,
        None,
    )?;
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_repo_with_commit;

    #[test]
    fn clean_worktree_reports_no_uncommitted_changes() {
        let (_dir, repo, _base) = init_repo_with_commit();
        assert!(!has_uncommitted_changes(&repo));
    }

    #[test]
    fn dirty_worktree_reports_uncommitted_changes() {
        let (_dir, repo, _base) = init_repo_with_commit();
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join("scratch.txt"), b"wip").unwrap();
        assert!(has_uncommitted_changes(&repo));
    }

    #[test]
    fn current_branch_name_returns_branch() {
        let (_dir, repo, _base) = init_repo_with_commit();
        let name = current_branch_name(&repo).unwrap();
        assert!(name.is_some());
    }

    #[test]
    fn count_unpushed_commits_with_no_upstream_is_zero_and_known() {
        let (_dir, repo, _base) = init_repo_with_commit();
        assert_eq!(count_unpushed_commits(&repo), (0, false));
    }

    #[test]
    fn staged_files_lists_only_what_is_in_the_index() {
        let (_dir, repo, _base) = init_repo_with_commit();
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join("staged.txt"), b"staged").unwrap();
        std::fs::write(workdir.join("unstaged.txt"), b"unstaged").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("staged.txt")).unwrap();
        index.write().unwrap();

        let staged = staged_files(&repo).unwrap();
        assert_eq!(staged, vec!["staged.txt".to_string()]);
    }

    #[test]
    fn files_changed_since_includes_unstaged_edits() {
        let (_dir, repo, base) = init_repo_with_commit();
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join("dirty.txt"), b"wip").unwrap();

        let changed = files_changed_since(&repo, base).unwrap();
        assert!(changed.contains(&"dirty.txt".to_string()));
    }
}
