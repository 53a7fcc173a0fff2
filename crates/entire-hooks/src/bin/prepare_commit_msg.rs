//! `prepare-commit-msg` hook: argv is `<commit-msg-file> [source] [sha1]`.
//! Fires before the commit object exists. Condenses whatever every
//! eligible session owes for this commit — anchored on the current HEAD,
//! or mid-turn with transcript edits overlapping the staged files — and,
//! if anything was condensed, rewrites the message file with the
//! `Entire-Checkpoint` trailer.

use entire_core::Engine;
use entire_hooks::trailer::{self, CHECKPOINT_TRAILER_KEY};

fn main() {
    entire_hooks::logging::init();

    let Ok((repo, paths)) = entire_hooks::open_current_repo() else {
        tracing::warn!(event = "hooks.prepare_commit_msg.no_repo", "not in a git repository, skipping");
        return;
    };

    let mut args = std::env::args().skip(1);
    let Some(msg_file) = args.next() else {
        return;
    };
    let source = args.next();

    // Merge and squash commit messages aren't turn boundaries the engine
    // needs to react to.
    if matches!(source.as_deref(), Some("merge") | Some("squash")) {
        return;
    }

    let message = match trailer::read(std::path::Path::new(&msg_file)) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(event = "hooks.prepare_commit_msg.read_failed", error = %e, "skipping");
            return;
        }
    };

    if entire_hooks::is_amend_source(source.as_deref()) {
        // An amend replaying a message that already carries a checkpoint
        // trailer must not re-condense: the prior checkpoint still stands.
        if trailer::find_trailer(&message, CHECKPOINT_TRAILER_KEY).is_some() {
            return;
        }
    }

    let worktree = entire_hooks::current_worktree_id(&repo);
    let worktree_root = match repo.workdir() {
        Some(w) => w.to_path_buf(),
        None => {
            tracing::warn!(event = "hooks.prepare_commit_msg.bare_repo", "bare repository has no worktree, skipping");
            return;
        }
    };

    let Ok(head_commit) = repo.head().and_then(|h| h.peel_to_commit()) else {
        return;
    };
    let current_head = head_commit.id().to_string();

    let engine = Engine::new(&repo, &paths, worktree, &worktree_root);
    let checkpoint = match engine.dispatch_git_commit(&current_head) {
        Ok(cp) => cp,
        Err(e) => {
            tracing::warn!(event = "hooks.prepare_commit_msg.dispatch_failed", error = %e, "continuing without blocking the commit");
            return;
        }
    };

    if let Some(checkpoint) = checkpoint {
        let rewritten = trailer::append_trailer(&message, CHECKPOINT_TRAILER_KEY, checkpoint.id.string());
        if let Err(e) = trailer::write(std::path::Path::new(&msg_file), &rewritten) {
            tracing::warn!(event = "hooks.prepare_commit_msg.write_failed", error = %e, "checkpoint condensed but trailer not written");
        }
    }
}
