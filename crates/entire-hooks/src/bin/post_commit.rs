//! `post-commit` hook: fires after the commit object exists, with no
//! argv. Advances every live session's base commit so the next turn's
//! shadow snapshots are taken against the right parent, distinguishing a
//! plain commit (which migrates the shadow onto the new head) from
//! `--amend` (which rewrites the base in place).

use entire_core::Engine;

fn main() {
    entire_hooks::logging::init();

    let Ok((repo, paths)) = entire_hooks::open_current_repo() else {
        tracing::warn!(event = "hooks.post_commit.no_repo", "not in a git repository, skipping");
        return;
    };

    let worktree = entire_hooks::current_worktree_id(&repo);
    let worktree_root = match repo.workdir() {
        Some(w) => w.to_path_buf(),
        None => return,
    };

    let Ok(head_commit) = repo.head().and_then(|h| h.peel_to_commit()) else {
        return;
    };
    let commit_id = head_commit.id().to_string();
    let parent_id = head_commit.parent_id(0).ok().map(|oid| oid.to_string());

    let engine = Engine::new(&repo, &paths, worktree, &worktree_root);

    let result = if entire_hooks::is_amend_invocation() {
        engine.dispatch_git_amend(&commit_id)
    } else {
        let Some(previous_head) = parent_id else {
            return;
        };
        engine.dispatch_git_post_commit(&previous_head, &commit_id)
    };

    if let Err(e) = result {
        tracing::warn!(event = "hooks.post_commit.dispatch_failed", error = %e, "continuing, commit already succeeded");
    }
}
