//! The checkpoint engine: translates hook events into session state
//! transitions, shadow snapshots, and condensations. One `Engine` is
//! constructed per hook invocation, over an already-open repository and
//! the worktree the hook fired in.
//!
//! Agent-side events (`SessionEvent`) are scoped to one session and never
//! condense. Git-side events are scoped to the whole state store, since a
//! single commit can fold turns from several sessions sharing the same
//! base commit into one checkpoint.

use std::path::Path;

use entire_paths::{CheckpointId, EntirePaths, SessionId, WorktreeId};
use entire_protocol::AgentDecoder;
use git2::{Oid, Repository};

use crate::checkpoint::{self, Checkpoint, CondenseSession, RewindMode};
use crate::errors::{CoreError, CoreResult};
use crate::session::{PromptAttribution, Session, SessionPhase};
use crate::store::SessionStore;

/// Agent-side turn lifecycle events, translated from the hook-on-stdin
/// interface (see `entire-hooks`'s agent-hook binary). Named after what
/// happened, not after which script observed it, so the same dispatch
/// logic handles every agent.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new prompt started on an `Idle` session (or a fresh one).
    PromptStart,
    /// The agent finished its turn; `user_lines_added` is the count of
    /// lines the attribution engine already knows came from the user
    /// directly (editor saves, not tool calls). Takes a shadow snapshot
    /// and records that turn's attribution, but does not condense —
    /// condensation only happens when a real commit lands.
    TurnEnd { user_lines_added: u64, prompt_text: String },
    /// A tool is about to run; recorded for ordering but does not itself
    /// change session phase.
    PreToolUse,
    /// A tool finished running.
    PostToolUse,
    /// The agent's todo list changed.
    PostTodo,
}

pub struct Engine<'a> {
    pub repo: &'a Repository,
    pub paths: &'a EntirePaths,
    pub worktree: WorktreeId,
    pub worktree_root: &'a Path,
    store: SessionStore,
}

impl<'a> Engine<'a> {
    pub fn new(repo: &'a Repository, paths: &'a EntirePaths, worktree: WorktreeId, worktree_root: &'a Path) -> Self {
        Self {
            repo,
            paths,
            worktree,
            worktree_root,
            store: SessionStore::new(paths.clone()),
        }
    }

    fn load_or_start(&self, id: &SessionId, base_commit: &str, agent: entire_protocol::AgentKind) -> CoreResult<Session> {
        match self.store.load(id)? {
            Some(session) => Ok(session),
            None => {
                tracing::info!(event = "core.engine.session_started", session_id = %id, "starting new session");
                Ok(Session::new(id.clone(), agent, self.worktree.clone(), base_commit.to_string()))
            }
        }
    }

    /// Handle one agent-side event for a single session, persisting
    /// whatever state changed. Never condenses: condensation is driven
    /// exclusively by the Git-side `dispatch_git_*` methods below, since
    /// only a real commit can make a checkpoint's base commit stable.
    pub fn dispatch_session_event(
        &self,
        id: &SessionId,
        base_commit: &str,
        agent: entire_protocol::AgentKind,
        transcript_path: Option<String>,
        event: SessionEvent,
    ) -> CoreResult<()> {
        let mut session = self.load_or_start(id, base_commit, agent)?;
        if let Some(path) = transcript_path {
            session.transcript_path = Some(path);
        }

        tracing::debug!(
            event = "core.engine.dispatch_started",
            session_id = %id,
            phase = ?session.phase,
            "dispatching session event"
        );

        match event {
            SessionEvent::PromptStart => session.start_turn(),
            SessionEvent::TurnEnd { user_lines_added, prompt_text } => {
                self.handle_turn_end(&mut session, user_lines_added, prompt_text)?;
            }
            SessionEvent::PreToolUse | SessionEvent::PostToolUse | SessionEvent::PostTodo => {}
        }

        self.store.save(&session)
    }

    /// Takes a shadow snapshot against the session's current base commit
    /// and records the turn's attribution. A turn that changed nothing is
    /// a no-op: no snapshot, no attribution record, straight back to idle.
    fn handle_turn_end(&self, session: &mut Session, user_lines_added: u64, prompt_text: String) -> CoreResult<()> {
        use entire_git::snapshot_worktree_to_shadow;

        let base_oid = Oid::from_str(&session.base_commit)?;
        let (_shadow_name, shadow_oid) =
            snapshot_worktree_to_shadow(self.repo, base_oid, &self.worktree, self.worktree_root)?;

        let base_commit = self.repo.find_commit(base_oid)?;
        let shadow_commit = self.repo.find_commit(shadow_oid)?;
        let reconciled = crate::attribution::attribute_turn(
            self.repo,
            Some(&base_commit.tree()?),
            &shadow_commit.tree()?,
            user_lines_added,
        )?;

        if reconciled.total_committed == 0 && reconciled.files_touched.is_empty() {
            session.end_turn();
            return Ok(());
        }

        session.record_attribution(PromptAttribution {
            sequence: session.attributions.len() as u32,
            prompt_text,
            user_lines_added: reconciled.user_lines_added,
            agent_lines_added: reconciled.agent_lines_added,
            human_modified: reconciled.human_modified,
            lines_removed: reconciled.lines_removed,
            files_touched: reconciled.files_touched,
            recorded_at: chrono::Utc::now(),
        });
        session.end_turn();
        Ok(())
    }

    /// `prepare-commit-msg`: gather every session anchored on `current_head`
    /// that either already has pending attribution (a turn ended but
    /// hasn't been committed yet) or, being `Active` with nothing
    /// snapshotted yet, reports live transcript edits overlapping the
    /// staged files — and fold them all into one checkpoint.
    pub fn dispatch_git_commit(&self, current_head: &str) -> CoreResult<Option<Checkpoint>> {
        let staged = entire_git::staged_files(self.repo).unwrap_or_default();
        let mut sessions = self.store.list()?;

        let mut eligible_idx = Vec::new();
        for (idx, session) in sessions.iter_mut().enumerate() {
            if session.base_commit != current_head || session.phase == SessionPhase::Ended {
                continue;
            }
            let has_pending = session.pending_attribution_count() > 0;
            let forced = !has_pending
                && session.phase == SessionPhase::Active
                && self.transcript_overlaps_staged(session, &staged);

            if forced {
                self.force_snapshot_turn(session)?;
            }
            if has_pending || forced {
                eligible_idx.push(idx);
            }
        }

        if eligible_idx.is_empty() {
            return Ok(None);
        }

        let base_oid = Oid::from_str(current_head)?;
        let shadow_oid = entire_git::find_shadow_for_base(self.repo, base_oid, &self.worktree)?
            .map(|(_, oid)| oid)
            .unwrap_or(base_oid);

        let mut inputs: Vec<CondenseSession> = Vec::with_capacity(eligible_idx.len());
        let mut eligible_iter = eligible_idx.iter().peekable();
        for (idx, session) in sessions.iter_mut().enumerate() {
            if eligible_iter.peek() != Some(&&idx) {
                continue;
            }
            eligible_iter.next();
            let (transcript_tail, transcript_offset, transcript_uuid) = self.transcript_tail(session);
            inputs.push(CondenseSession { session, transcript_offset, transcript_uuid, transcript_tail });
        }

        let checkpoint = checkpoint::condense(self.repo, &self.worktree, current_head, shadow_oid, &mut inputs)?;

        for session in sessions.iter() {
            self.store.save(session)?;
        }

        Ok(Some(checkpoint))
    }

    /// `post-commit`: advance every session anchored on the commit's old
    /// parent to the new HEAD, migrating the shared shadow branch (rather
    /// than abandoning it) so history accumulated before a mid-turn commit
    /// survives onto the new base.
    pub fn dispatch_git_post_commit(&self, previous_head: &str, new_base_commit: &str) -> CoreResult<()> {
        let mut sessions = self.store.list()?;
        let affects_any = sessions
            .iter()
            .any(|s| s.base_commit == previous_head && s.phase != SessionPhase::Ended);

        if affects_any {
            let old_base_oid = Oid::from_str(previous_head)?;
            let new_base_oid = Oid::from_str(new_base_commit)?;
            entire_git::migrate_shadow(self.repo, old_base_oid, new_base_oid, &self.worktree)?;
        }

        for session in sessions.iter_mut() {
            if session.base_commit != previous_head || session.phase == SessionPhase::Ended {
                continue;
            }
            session.base_commit = new_base_commit.to_string();
            session.attribution_base_commit = new_base_commit.to_string();
            if session.pending_attribution_count() > 0 {
                // Defensive: prepare-commit-msg should already have
                // condensed this session; clear it so the next commit
                // doesn't double-count these lines.
                session.attributions.clear();
            }
            self.store.save(session)?;
        }

        Ok(())
    }

    /// `git commit --amend`: the amended commit replaces rather than
    /// follows the old one, so every live session's base is rewritten in
    /// place rather than advanced.
    pub fn dispatch_git_amend(&self, amended_commit: &str) -> CoreResult<()> {
        let sessions = self.store.list()?;
        for mut session in sessions {
            if session.phase == SessionPhase::Ended {
                continue;
            }
            session.base_commit = amended_commit.to_string();
            session.attribution_base_commit = amended_commit.to_string();
            self.store.save(&session)?;
        }
        Ok(())
    }

    fn transcript_overlaps_staged(&self, session: &Session, staged: &[String]) -> bool {
        let Some(path) = session.transcript_path.as_deref() else { return false };
        let decoder = entire_protocol::get_decoder(session.agent);
        let Ok(transcript) = decoder.read_session(Path::new(path)) else { return false };
        let modified = decoder.modified_files(&transcript);
        modified.iter().any(|f| staged.contains(f))
    }

    /// Snapshot the worktree before force-condensing a mid-turn commit so
    /// the in-progress turn's edits land in the shadow tree the checkpoint
    /// points at, exactly as a normal `TurnEnd` would have captured them.
    fn force_snapshot_turn(&self, session: &mut Session) -> CoreResult<()> {
        use entire_git::snapshot_worktree_to_shadow;

        let base_oid = Oid::from_str(&session.base_commit)?;
        let (_name, shadow_oid) =
            snapshot_worktree_to_shadow(self.repo, base_oid, &self.worktree, self.worktree_root)?;

        let base_commit = self.repo.find_commit(base_oid)?;
        let shadow_commit = self.repo.find_commit(shadow_oid)?;
        let reconciled = crate::attribution::attribute_turn(self.repo, Some(&base_commit.tree()?), &shadow_commit.tree()?, 0)?;

        session.record_attribution(PromptAttribution {
            sequence: session.attributions.len() as u32,
            prompt_text: String::new(),
            user_lines_added: reconciled.user_lines_added,
            agent_lines_added: reconciled.agent_lines_added,
            human_modified: reconciled.human_modified,
            lines_removed: reconciled.lines_removed,
            files_touched: reconciled.files_touched,
            recorded_at: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Read the unfolded tail of a session's transcript (everything past
    /// its last checkpoint's offset) and the anchor a future rewind would
    /// truncate back to.
    fn transcript_tail(&self, session: &Session) -> (Vec<u8>, usize, Option<String>) {
        let Some(path) = session.transcript_path.as_deref() else {
            return (Vec::new(), session.last_checkpoint_transcript_offset, None);
        };
        let decoder = entire_protocol::get_decoder(session.agent);
        let transcript = match decoder.read_session(Path::new(path)) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    event = "core.engine.transcript_read_failed",
                    session_id = %session.id,
                    error = %e,
                    "proceeding without transcript content"
                );
                return (Vec::new(), session.last_checkpoint_transcript_offset, None);
            }
        };

        let start = session.last_checkpoint_transcript_offset.min(transcript.len());
        let tail = &transcript.0[start..];
        let uuid = tail
            .last()
            .and_then(|l| l.uuid.clone())
            .or_else(|| session.last_checkpoint_transcript_uuid.clone());

        let mut bytes = Vec::new();
        for line in tail {
            if let Ok(s) = serde_json::to_string(&line.raw) {
                bytes.extend_from_slice(s.as_bytes());
                bytes.push(b'\n');
            }
        }
        (bytes, transcript.len(), uuid)
    }

    pub fn rewind_session(
        &self,
        id: &SessionId,
        checkpoint_id: &CheckpointId,
        decoder: &dyn AgentDecoder,
        transcript_path: &Path,
        mode: RewindMode,
    ) -> CoreResult<()> {
        let mut session = self
            .store
            .load(id)?
            .ok_or_else(|| CoreError::SessionNotFound(id.as_str().to_string()))?;

        let target = checkpoint::load_checkpoint(self.repo, checkpoint_id)?.ok_or_else(|| {
            CoreError::RewindTargetMissing {
                session_id: id.as_str().to_string(),
                checkpoint_id: checkpoint_id.string().to_string(),
            }
        })?;

        checkpoint::rewind(
            self.repo,
            decoder,
            transcript_path,
            self.worktree_root,
            &self.worktree,
            &mut session,
            &target,
            mode,
        )?;

        self.store.save(&session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use entire_git::test_support::init_repo_with_commit;
    use entire_protocol::AgentKind;

    fn session_id(raw: &str) -> SessionId {
        SessionId::from_raw_agent_id(raw, NaiveDate::from_ymd_opt(2026, 8, 1).unwrap())
    }

    #[test]
    fn turn_end_snapshots_without_condensing() {
        let (dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        std::fs::write(worktree_root.join("a.txt"), b"agent wrote this\n").unwrap();

        let paths = EntirePaths::from_git_common_dir(dir.path().join(".entire-state"));
        let engine = Engine::new(&repo, &paths, WorktreeId::new(""), &worktree_root);
        let id = session_id("session-1");

        engine
            .dispatch_session_event(
                &id,
                &base.to_string(),
                AgentKind::Generic,
                None,
                SessionEvent::TurnEnd { user_lines_added: 0, prompt_text: "add a.txt".into() },
            )
            .unwrap();

        let session = engine.store.load(&id).unwrap().unwrap();
        assert_eq!(session.phase, SessionPhase::Idle);
        assert_eq!(session.pending_attribution_count(), 1);
    }

    #[test]
    fn turn_end_with_no_changes_records_nothing() {
        let (dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();

        let paths = EntirePaths::from_git_common_dir(dir.path().join(".entire-state"));
        let engine = Engine::new(&repo, &paths, WorktreeId::new(""), &worktree_root);
        let id = session_id("session-1b");

        engine
            .dispatch_session_event(
                &id,
                &base.to_string(),
                AgentKind::Generic,
                None,
                SessionEvent::TurnEnd { user_lines_added: 0, prompt_text: "thought about it".into() },
            )
            .unwrap();

        let session = engine.store.load(&id).unwrap().unwrap();
        assert_eq!(session.pending_attribution_count(), 0);
    }

    #[test]
    fn git_commit_folds_two_sessions_sharing_a_base_into_one_checkpoint() {
        let (dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        std::fs::write(worktree_root.join("a.txt"), b"agent wrote this\n").unwrap();

        let paths = EntirePaths::from_git_common_dir(dir.path().join(".entire-state"));
        let engine = Engine::new(&repo, &paths, WorktreeId::new(""), &worktree_root);
        let id_a = session_id("session-2a");
        let id_b = session_id("session-2b");

        engine
            .dispatch_session_event(
                &id_a,
                &base.to_string(),
                AgentKind::Generic,
                None,
                SessionEvent::TurnEnd { user_lines_added: 0, prompt_text: "add a.txt".into() },
            )
            .unwrap();
        engine
            .dispatch_session_event(
                &id_b,
                &base.to_string(),
                AgentKind::Generic,
                None,
                SessionEvent::TurnEnd { user_lines_added: 0, prompt_text: "also touched a.txt".into() },
            )
            .unwrap();

        let checkpoint = engine.dispatch_git_commit(&base.to_string()).unwrap();

        assert!(checkpoint.is_some());
        let checkpoint = checkpoint.unwrap();
        assert_eq!(checkpoint.sessions.len(), 2);

        assert_eq!(engine.store.load(&id_a).unwrap().unwrap().pending_attribution_count(), 0);
        assert_eq!(engine.store.load(&id_b).unwrap().unwrap().pending_attribution_count(), 0);
    }

    #[test]
    fn git_commit_with_nothing_pending_is_a_no_op() {
        let (dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        let paths = EntirePaths::from_git_common_dir(dir.path().join(".entire-state"));
        let engine = Engine::new(&repo, &paths, WorktreeId::new(""), &worktree_root);

        let checkpoint = engine.dispatch_git_commit(&base.to_string()).unwrap();
        assert!(checkpoint.is_none());
    }

    #[test]
    fn git_post_commit_migrates_shadow_and_advances_base() {
        let (dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        std::fs::write(worktree_root.join("a.txt"), b"agent wrote this\n").unwrap();

        let paths = EntirePaths::from_git_common_dir(dir.path().join(".entire-state"));
        let engine = Engine::new(&repo, &paths, WorktreeId::new(""), &worktree_root);
        let id = session_id("session-3");

        engine
            .dispatch_session_event(
                &id,
                &base.to_string(),
                AgentKind::Generic,
                None,
                SessionEvent::PromptStart,
            )
            .unwrap();
        entire_git::snapshot_worktree_to_shadow(&repo, base, &WorktreeId::new(""), &worktree_root).unwrap();

        // post-commit needs a real commit object for migrate_shadow's new parent.
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        let tree_oid = {
            let mut index = repo.index().unwrap();
            index.write_tree().unwrap()
        };
        let tree = repo.find_tree(tree_oid).unwrap();
        let parent = repo.find_commit(base).unwrap();
        let new_commit_oid = repo.commit(None, &sig, &sig, "second commit", &tree, &[&parent]).unwrap();

        engine.dispatch_git_post_commit(&base.to_string(), &new_commit_oid.to_string()).unwrap();

        let session = engine.store.load(&id).unwrap().unwrap();
        assert_eq!(session.base_commit, new_commit_oid.to_string());
    }

    #[test]
    fn git_amend_rewrites_base_for_every_live_session() {
        let (dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        let paths = EntirePaths::from_git_common_dir(dir.path().join(".entire-state"));
        let engine = Engine::new(&repo, &paths, WorktreeId::new(""), &worktree_root);
        let id = session_id("session-4");

        engine
            .dispatch_session_event(&id, &base.to_string(), AgentKind::Generic, None, SessionEvent::PromptStart)
            .unwrap();

        let amended = "2".repeat(40);
        engine.dispatch_git_amend(&amended).unwrap();

        let session = engine.store.load(&id).unwrap().unwrap();
        assert_eq!(session.base_commit, amended);
    }
}
