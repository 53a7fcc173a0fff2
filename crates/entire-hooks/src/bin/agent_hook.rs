//! Agent hook binary: consumes the JSON-on-stdin interface every
//! supported coding agent's own hook configuration invokes
//! (`UserPromptSubmit`, `PreToolUse`, `PostToolUse`, `Stop`/
//! `SubagentStop`), translates it into a `SessionEvent`, and dispatches it
//! to the engine. This is the runtime entry point for a live agent turn;
//! `entire-core`'s state machine has no other way to see one.

use std::io::Read;
use std::path::Path;

use entire_core::{Engine, SessionEvent};
use entire_protocol::{get_decoder, AgentKind, HookEventName, HookInput};

fn main() {
    entire_hooks::logging::init();

    let mut buf = String::new();
    if std::io::stdin().read_to_string(&mut buf).is_err() {
        tracing::warn!(event = "hooks.agent_hook.stdin_read_failed", "skipping");
        return;
    }

    let input: HookInput = match serde_json::from_str(&buf) {
        Ok(i) => i,
        Err(e) => {
            tracing::warn!(event = "hooks.agent_hook.parse_failed", error = %e, "skipping");
            return;
        }
    };

    let Ok((repo, paths)) = entire_hooks::open_current_repo() else {
        tracing::warn!(event = "hooks.agent_hook.no_repo", "not in a git repository, skipping");
        return;
    };
    let worktree = entire_hooks::current_worktree_id(&repo);
    let worktree_root = match repo.workdir() {
        Some(w) => w.to_path_buf(),
        None => {
            tracing::warn!(event = "hooks.agent_hook.bare_repo", "bare repository has no worktree, skipping");
            return;
        }
    };
    let Ok(head_commit) = repo.head().and_then(|h| h.peel_to_commit()) else {
        return;
    };
    let base_commit = head_commit.id().to_string();

    let session_id =
        entire_paths::SessionId::from_raw_agent_id(&input.session_id, chrono::Utc::now().date_naive());
    let transcript_path = (!input.transcript_path.is_empty()).then(|| input.transcript_path.clone());

    let event = match input.hook_event_name {
        HookEventName::UserPromptSubmit => SessionEvent::PromptStart,
        HookEventName::Stop | HookEventName::SubagentStop => {
            let prompt_text = transcript_path
                .as_deref()
                .map(|p| last_user_prompt(AgentKind::Generic, Path::new(p)))
                .unwrap_or_default();
            // The hook payload carries no line-level accounting of its own;
            // the engine's own shadow-diff reconciliation in `attribute_turn`
            // is what actually separates user from agent lines.
            SessionEvent::TurnEnd { user_lines_added: 0, prompt_text }
        }
        HookEventName::PreToolUse => SessionEvent::PreToolUse,
        HookEventName::PostToolUse if input.todos.is_some() => SessionEvent::PostTodo,
        HookEventName::PostToolUse => SessionEvent::PostToolUse,
    };

    let engine = Engine::new(&repo, &paths, worktree, &worktree_root);
    if let Err(e) = engine.dispatch_session_event(&session_id, &base_commit, AgentKind::Generic, transcript_path, event)
    {
        tracing::warn!(event = "hooks.agent_hook.dispatch_failed", error = %e, "continuing without blocking the agent");
    }
}

/// Best-effort extraction of the most recent user message's text, for the
/// checkpoint's prompt record. A transcript the decoder can't read, or
/// with no user-typed line at all, yields an empty prompt rather than
/// failing the hook.
fn last_user_prompt(agent: AgentKind, path: &Path) -> String {
    let decoder = get_decoder(agent);
    let Ok(transcript) = decoder.read_session(path) else {
        return String::new();
    };
    transcript
        .0
        .iter()
        .rev()
        .find_map(|line| {
            if line.raw.get("type").and_then(|v| v.as_str()) != Some("user") {
                return None;
            }
            line.raw
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}
