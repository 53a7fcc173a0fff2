//! `pre-push` hook: argv is `<remote-name> <remote-url>`; stdin carries one
//! `<local-ref> <local-sha> <remote-ref> <remote-sha>` line per ref being
//! pushed. This hook never rejects a push — it surfaces sessions that
//! still have uncondensed turns, and best-effort pushes the checkpoint
//! metadata ref alongside the user's own push so condensed checkpoints
//! travel to whoever fetches next.

use std::io::BufRead;

use entire_paths::CHECKPOINTS_INDEX_REF;

fn metadata_ref() -> String {
    format!("refs/{CHECKPOINTS_INDEX_REF}")
}

fn main() {
    entire_hooks::logging::init();

    let Ok((repo, paths)) = entire_hooks::open_current_repo() else {
        return;
    };

    let remote_name = std::env::args().nth(1);

    let stdin = std::io::stdin();
    let pushed_shas: Vec<String> = stdin
        .lock()
        .lines()
        .map_while(Result::ok)
        .filter_map(|line| line.split_whitespace().nth(1).map(str::to_string))
        .collect();

    let store = entire_core::SessionStore::new(paths);
    let Ok(sessions) = store.list() else {
        return;
    };

    for session in &sessions {
        let pending = session.pending_attribution_count();
        if pending > 0 && pushed_shas.contains(&session.base_commit) {
            tracing::warn!(
                event = "hooks.pre_push.uncondensed_session",
                session_id = %session.id,
                pending_turns = pending,
                "pushing a commit with an in-progress, uncondensed session"
            );
        }
    }

    if repo.find_reference(&metadata_ref()).is_ok() {
        push_metadata_ref(&repo, remote_name.as_deref());
    }
}

/// Best-effort push of the checkpoint metadata ref alongside the user's
/// own push. Any remote error here is logged and swallowed; the user's
/// push is already in flight and must never be blocked by it.
fn push_metadata_ref(repo: &git2::Repository, remote_name: Option<&str>) {
    let Some(remote_name) = remote_name else { return };
    let mut remote = match repo.find_remote(remote_name) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(
                event = "hooks.pre_push.remote_lookup_failed",
                remote = remote_name,
                error = %e,
                "skipping metadata ref push"
            );
            return;
        }
    };

    let metadata_ref = metadata_ref();
    let refspec = format!("{metadata_ref}:{metadata_ref}");
    if let Err(e) = remote.push(&[refspec.as_str()], None) {
        tracing::warn!(
            event = "hooks.pre_push.metadata_push_failed",
            remote = remote_name,
            error = %e,
            "continuing, user's own push already in flight"
        );
    }
}
