//! Condensation: folding every session anchored on one base commit into a
//! single content-addressed checkpoint, and the rewind protocol that
//! undoes it.
//!
//! Checkpoint metadata lives on the `entire/checkpoints/v1` ref as a
//! sharded tree of git objects (see `entire_git::commit_checkpoint_blobs`),
//! not on the filesystem, so it travels with `git push`/`git fetch` the
//! same way the rest of the repository's history does.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use entire_git::CheckpointBlob;
use entire_paths::{CheckpointId, WorktreeId};
use entire_protocol::{AgentDecoder, AgentKind, Transcript};
use git2::{Oid, Repository};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{CoreError, CoreResult};
use crate::session::{PromptAttribution, Session};

/// One session's slice of a checkpoint: everything folded from it, and
/// where its transcript had gotten to, so a rewind can put it back exactly
/// where it was, possibly on a different machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSession {
    pub session_id: String,
    pub agent: AgentKind,
    /// Name of the decoder strategy this session's transcript was read
    /// and written with, so a rewind elsewhere picks up the same one.
    pub strategy: String,
    pub prompts: Vec<PromptAttribution>,
    pub files_touched: Vec<String>,
    pub transcript_offset: usize,
    pub transcript_uuid: Option<String>,
    pub transcript_content_hash: Option<String>,
}

/// Condensed, content-addressed record of everything folded into one
/// checkpoint: every session anchored on `base_commit` at condensation
/// time, the shadow snapshot they condensed from, and the aggregate
/// attribution breakdown across all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub base_commit: String,
    pub shadow_commit: String,
    pub sessions: Vec<CheckpointSession>,
    pub agent_lines: u64,
    pub human_added: u64,
    pub human_modified: u64,
    pub human_removed: u64,
    pub total_committed: u64,
    /// Percentage (0-100) of `total_committed` attributed to the agent
    /// across every folded session.
    pub agent_percentage: u8,
    pub files_touched: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One session's condensation input: a mutable borrow of the session
/// itself (advanced past its folded turns on success) plus whatever
/// transcript content is being folded into this checkpoint alongside it.
pub struct CondenseSession<'a> {
    pub session: &'a mut Session,
    pub transcript_offset: usize,
    pub transcript_uuid: Option<String>,
    pub transcript_tail: Vec<u8>,
}

/// Derive a checkpoint's content ID from everything that determines its
/// content: the base commit, the shadow snapshot, and every folded
/// session's prompts, files touched, and transcript tail. Two
/// condensations of identical inputs produce the same ID; checkpoint IDs
/// are content-stable, not sequence-numbered.
fn derive_checkpoint_id(base_commit: &str, shadow_commit: &str, sessions: &[CondenseSession]) -> CheckpointId {
    let mut hasher = Sha256::new();
    hasher.update(base_commit.as_bytes());
    hasher.update(shadow_commit.as_bytes());

    let mut files_touched: BTreeSet<&str> = BTreeSet::new();
    for cs in sessions {
        hasher.update(cs.session.id.as_str().as_bytes());
        for prompt in &cs.session.attributions {
            hasher.update(prompt.sequence.to_le_bytes());
            hasher.update(prompt.prompt_text.as_bytes());
            hasher.update(prompt.user_lines_added.to_le_bytes());
            hasher.update(prompt.agent_lines_added.to_le_bytes());
            hasher.update(prompt.human_modified.to_le_bytes());
            hasher.update(prompt.lines_removed.to_le_bytes());
        }
        hasher.update(&cs.transcript_tail);
        files_touched.extend(cs.session.files_touched.iter().map(String::as_str));
    }
    for file in files_touched {
        hasher.update(file.as_bytes());
    }

    let digest = hex::encode(hasher.finalize());
    CheckpointId::from_digest_prefix(&digest)
}

fn render_context(checkpoint: &Checkpoint) -> String {
    let mut out = format!(
        "# Checkpoint {}\n\nBase commit: {}\nSessions: {}\nAgent lines: {}\nHuman added: {}\nHuman modified: {}\nHuman removed: {}\nAgent share: {}%\n\nFiles touched:\n",
        checkpoint.id,
        checkpoint.base_commit,
        checkpoint.sessions.len(),
        checkpoint.agent_lines,
        checkpoint.human_added,
        checkpoint.human_modified,
        checkpoint.human_removed,
        checkpoint.agent_percentage,
    );
    for file in &checkpoint.files_touched {
        out.push_str("- ");
        out.push_str(file);
        out.push('\n');
    }
    out
}

/// Fold every session's pending attributions into a single new checkpoint,
/// commit its metadata onto the checkpoint index ref, and advance each
/// session past what it just folded.
///
/// `shadow_commit` is the OID of the shared shadow snapshot all of these
/// sessions condense from. On success the shadow branch is reset back to
/// `base_commit` so the next turn starts clean rather than accumulating
/// snapshot commits forever.
pub fn condense(
    repo: &Repository,
    worktree: &WorktreeId,
    base_commit: &str,
    shadow_commit: Oid,
    sessions: &mut [CondenseSession],
) -> CoreResult<Checkpoint> {
    let shadow_commit_hex = shadow_commit.to_string();
    let checkpoint_id = derive_checkpoint_id(base_commit, &shadow_commit_hex, sessions);

    let mut agent_lines = 0u64;
    let mut human_added = 0u64;
    let mut human_modified = 0u64;
    let mut human_removed = 0u64;
    let mut files_touched: BTreeSet<String> = BTreeSet::new();
    let mut checkpoint_sessions = Vec::with_capacity(sessions.len());
    let mut blobs: Vec<CheckpointBlob> = Vec::new();

    for cs in sessions.iter() {
        let decoder = entire_protocol::get_decoder(cs.session.agent);

        for prompt in &cs.session.attributions {
            agent_lines += prompt.agent_lines_added;
            human_added += prompt.user_lines_added;
            human_modified += prompt.human_modified;
            human_removed += prompt.lines_removed;
        }
        files_touched.extend(cs.session.files_touched.iter().cloned());

        let transcript_content_hash = if cs.transcript_tail.is_empty() {
            None
        } else {
            let mut hasher = Sha256::new();
            hasher.update(&cs.transcript_tail);
            Some(hex::encode(hasher.finalize()))
        };

        let session_dir = checkpoint_id.path().join("sessions").join(cs.session.id.as_str());
        if !cs.transcript_tail.is_empty() {
            blobs.push(CheckpointBlob {
                relative_path: session_dir.join("full.jsonl"),
                content: cs.transcript_tail.clone(),
            });
        }
        if let Some(hash) = &transcript_content_hash {
            blobs.push(CheckpointBlob {
                relative_path: session_dir.join("content_hash.txt"),
                content: hash.clone().into_bytes(),
            });
        }
        let prompt_text = cs
            .session
            .attributions
            .iter()
            .map(|p| p.prompt_text.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        blobs.push(CheckpointBlob {
            relative_path: session_dir.join("prompt.txt"),
            content: prompt_text.into_bytes(),
        });

        checkpoint_sessions.push(CheckpointSession {
            session_id: cs.session.id.as_str().to_string(),
            agent: cs.session.agent,
            strategy: decoder.name().to_string(),
            prompts: cs.session.attributions.clone(),
            files_touched: cs.session.files_touched.clone(),
            transcript_offset: cs.transcript_offset,
            transcript_uuid: cs.transcript_uuid.clone(),
            transcript_content_hash,
        });
    }

    let total_committed = human_added + agent_lines;
    let agent_percentage = if total_committed == 0 {
        0
    } else {
        ((agent_lines.saturating_sub(human_modified)) * 100 / total_committed) as u8
    };

    let checkpoint = Checkpoint {
        id: checkpoint_id.clone(),
        base_commit: base_commit.to_string(),
        shadow_commit: shadow_commit_hex,
        sessions: checkpoint_sessions,
        agent_lines,
        human_added,
        human_modified,
        human_removed,
        total_committed,
        agent_percentage,
        files_touched: files_touched.into_iter().collect(),
        created_at: Utc::now(),
    };

    blobs.push(CheckpointBlob {
        relative_path: checkpoint_id.path().join("metadata.json"),
        content: serde_json::to_vec_pretty(&checkpoint).map_err(|e| CoreError::StateStoreIo {
            message: format!("failed to serialize checkpoint: {e}"),
        })?,
    });
    blobs.push(CheckpointBlob {
        relative_path: checkpoint_id.path().join("context.md"),
        content: render_context(&checkpoint).into_bytes(),
    });

    entire_git::commit_checkpoint_blobs(repo, &blobs)?;

    let base_oid = Oid::from_str(base_commit)?;
    entire_git::reset_shadow_to_base(repo, base_oid, worktree)?;

    for cs in sessions.iter_mut() {
        cs.session
            .mark_condensed(checkpoint_id.clone(), cs.transcript_offset, cs.transcript_uuid.clone());
    }

    tracing::info!(
        event = "core.checkpoint.condensed",
        checkpoint_id = %checkpoint.id,
        sessions = checkpoint.sessions.len(),
        "folded pending turns into a checkpoint"
    );

    Ok(checkpoint)
}

/// Load a checkpoint's metadata back off the checkpoint index ref.
pub fn load_checkpoint(repo: &Repository, id: &CheckpointId) -> CoreResult<Option<Checkpoint>> {
    let path = id.path().join("metadata.json");
    match entire_git::read_checkpoint_blob(repo, &path)? {
        Some(bytes) => {
            let checkpoint = serde_json::from_slice(&bytes).map_err(|e| CoreError::StateStoreIo {
                message: format!("failed to parse checkpoint {}: {e}", path.display()),
            })?;
            Ok(Some(checkpoint))
        }
        None => Ok(None),
    }
}

/// The three rewind variants: how much of "what happened since this
/// checkpoint" gets undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewindMode {
    /// Restore the worktree's files to the checkpoint's shadow snapshot
    /// and truncate the transcript back to its anchor. The strongest
    /// variant: undoes both code and conversation history.
    Full,
    /// Truncate the transcript only; leave the worktree files untouched.
    /// Used when the user wants to re-prompt from an earlier point in the
    /// conversation but keep whatever the agent has written since.
    LogsOnly,
    /// Reset the shadow branch back to the checkpoint's base commit
    /// without touching the transcript or the worktree. Used to discard
    /// an in-progress turn's snapshot after an error, before any
    /// condensation happened.
    ResetShadowOnly,
}

pub fn rewind(
    repo: &Repository,
    decoder: &dyn AgentDecoder,
    transcript_path: &Path,
    worktree_root: &Path,
    worktree: &WorktreeId,
    session: &mut Session,
    target: &Checkpoint,
    mode: RewindMode,
) -> CoreResult<()> {
    let session_entry = target
        .sessions
        .iter()
        .find(|s| s.session_id == session.id.as_str())
        .ok_or_else(|| CoreError::RewindTargetMissing {
            session_id: session.id.as_str().to_string(),
            checkpoint_id: target.id.string().to_string(),
        })?;

    match mode {
        RewindMode::Full => {
            let shadow_oid = Oid::from_str(&target.shadow_commit)?;
            entire_git::restore_workdir_from_tree(repo, shadow_oid, worktree_root)?;
            truncate_transcript(decoder, transcript_path, session_entry)?;
        }
        RewindMode::LogsOnly => {
            truncate_transcript(decoder, transcript_path, session_entry)?;
        }
        RewindMode::ResetShadowOnly => {
            let base_oid = Oid::from_str(&target.base_commit)?;
            entire_git::reset_shadow_to_base(repo, base_oid, worktree)?;
        }
    }

    session.mark_condensed(
        target.id.clone(),
        session_entry.transcript_offset,
        session_entry.transcript_uuid.clone(),
    );

    tracing::info!(
        event = "core.checkpoint.rewound",
        checkpoint_id = %target.id,
        mode = ?mode,
        "rewound session to checkpoint"
    );

    Ok(())
}

fn truncate_transcript(
    decoder: &dyn AgentDecoder,
    transcript_path: &Path,
    session_entry: &CheckpointSession,
) -> CoreResult<()> {
    let transcript = decoder.read_session(transcript_path)?;
    let truncated = match &session_entry.transcript_uuid {
        Some(uuid) => decoder.truncate_at_uuid(transcript, uuid),
        None => Transcript(transcript.0.into_iter().take(session_entry.transcript_offset).collect()),
    };
    decoder.write_session(transcript_path, &truncated)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use entire_git::test_support::init_repo_with_commit;
    use entire_paths::SessionId;
    use entire_protocol::get_decoder;

    fn attribution(seq: u32, text: &str) -> PromptAttribution {
        PromptAttribution {
            sequence: seq,
            prompt_text: text.to_string(),
            user_lines_added: 1,
            agent_lines_added: 5,
            human_modified: 0,
            lines_removed: 0,
            files_touched: vec!["a.rs".into()],
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn condensation_is_content_stable() {
        let (_dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        let wt = WorktreeId::new("");
        let (_name, shadow_oid) = entire_git::snapshot_worktree_to_shadow(&repo, base, &wt, &worktree_root).unwrap();

        let mut session_a = Session::new(SessionId::new("2026-08-01-a"), AgentKind::Generic, wt.clone(), base.to_string());
        session_a.record_attribution(attribution(0, "fix the bug"));
        let mut session_b = session_a.clone();

        let cp1 = {
            let mut inputs = vec![CondenseSession {
                session: &mut session_a,
                transcript_offset: 10,
                transcript_uuid: None,
                transcript_tail: Vec::new(),
            }];
            condense(&repo, &wt, &base.to_string(), shadow_oid, &mut inputs).unwrap()
        };
        let cp2 = {
            let mut inputs = vec![CondenseSession {
                session: &mut session_b,
                transcript_offset: 10,
                transcript_uuid: None,
                transcript_tail: Vec::new(),
            }];
            condense(&repo, &wt, &base.to_string(), shadow_oid, &mut inputs).unwrap()
        };

        assert_eq!(cp1.id, cp2.id);
    }

    #[test]
    fn condense_folds_multiple_sessions_into_one_checkpoint() {
        let (_dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        let wt = WorktreeId::new("");
        let (_name, shadow_oid) = entire_git::snapshot_worktree_to_shadow(&repo, base, &wt, &worktree_root).unwrap();

        let mut session_a = Session::new(SessionId::new("2026-08-01-a"), AgentKind::Generic, wt.clone(), base.to_string());
        session_a.record_attribution(attribution(0, "fix the bug"));
        let mut session_b = Session::new(SessionId::new("2026-08-01-b"), AgentKind::Generic, wt.clone(), base.to_string());
        session_b.record_attribution(attribution(0, "add tests"));

        let mut inputs = vec![
            CondenseSession {
                session: &mut session_a,
                transcript_offset: 5,
                transcript_uuid: None,
                transcript_tail: Vec::new(),
            },
            CondenseSession {
                session: &mut session_b,
                transcript_offset: 3,
                transcript_uuid: None,
                transcript_tail: Vec::new(),
            },
        ];
        let checkpoint = condense(&repo, &wt, &base.to_string(), shadow_oid, &mut inputs).unwrap();

        assert_eq!(checkpoint.sessions.len(), 2);
        assert_eq!(checkpoint.agent_lines, 10);
        assert_eq!(session_a.pending_attribution_count(), 0);
        assert_eq!(session_b.pending_attribution_count(), 0);
    }

    #[test]
    fn condense_resets_shadow_branch_to_base() {
        let (_dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        let wt = WorktreeId::new("");
        let (shadow_name, shadow_oid) = entire_git::snapshot_worktree_to_shadow(&repo, base, &wt, &worktree_root).unwrap();

        let mut session = Session::new(SessionId::new("2026-08-01-a"), AgentKind::Generic, wt.clone(), base.to_string());
        session.record_attribution(attribution(0, ""));

        let mut inputs = vec![CondenseSession {
            session: &mut session,
            transcript_offset: 1,
            transcript_uuid: None,
            transcript_tail: Vec::new(),
        }];
        condense(&repo, &wt, &base.to_string(), shadow_oid, &mut inputs).unwrap();

        let refname = format!("refs/{shadow_name}");
        let r = repo.find_reference(&refname).unwrap();
        assert_eq!(r.target().unwrap(), base);
    }

    #[test]
    fn load_checkpoint_round_trips_through_the_metadata_ref() {
        let (_dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        let wt = WorktreeId::new("");
        let (_name, shadow_oid) = entire_git::snapshot_worktree_to_shadow(&repo, base, &wt, &worktree_root).unwrap();

        let mut session = Session::new(SessionId::new("2026-08-01-a"), AgentKind::Generic, wt.clone(), base.to_string());
        session.record_attribution(attribution(0, "fix the bug"));

        let mut inputs = vec![CondenseSession {
            session: &mut session,
            transcript_offset: 1,
            transcript_uuid: None,
            transcript_tail: b"{\"uuid\":\"x\"}\n".to_vec(),
        }];
        let checkpoint = condense(&repo, &wt, &base.to_string(), shadow_oid, &mut inputs).unwrap();

        let loaded = load_checkpoint(&repo, &checkpoint.id).unwrap().unwrap();
        assert_eq!(loaded.id, checkpoint.id);
        assert_eq!(loaded.sessions.len(), 1);
        assert!(loaded.sessions[0].transcript_content_hash.is_some());
    }

    #[test]
    fn full_rewind_restores_files_and_truncates_transcript() {
        let (_dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        let wt = WorktreeId::new("");
        std::fs::write(worktree_root.join("a.txt"), b"checkpoint-content").unwrap();
        let (_name, shadow_oid) = entire_git::snapshot_worktree_to_shadow(&repo, base, &wt, &worktree_root).unwrap();

        let mut session = Session::new(SessionId::new("2026-08-01-a"), AgentKind::Generic, wt.clone(), base.to_string());
        session.record_attribution(attribution(0, ""));
        let mut inputs = vec![CondenseSession {
            session: &mut session,
            transcript_offset: 1,
            transcript_uuid: None,
            transcript_tail: Vec::new(),
        }];
        let checkpoint = condense(&repo, &wt, &base.to_string(), shadow_oid, &mut inputs).unwrap();

        std::fs::write(worktree_root.join("a.txt"), b"edited after checkpoint").unwrap();
        std::fs::write(worktree_root.join("b.txt"), b"new file").unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let transcript_path = scratch.path().join("transcript.jsonl");
        std::fs::write(&transcript_path, "{\"uuid\":\"x\"}\n{\"uuid\":\"y\"}\n").unwrap();

        let decoder = get_decoder(AgentKind::Generic);
        rewind(&repo, decoder, &transcript_path, &worktree_root, &wt, &mut session, &checkpoint, RewindMode::Full).unwrap();

        assert_eq!(std::fs::read(worktree_root.join("a.txt")).unwrap(), b"checkpoint-content");
        assert!(!worktree_root.join("b.txt").exists());
    }

    #[test]
    fn logs_only_rewind_leaves_the_working_tree_untouched() {
        let (_dir, repo, base) = init_repo_with_commit();
        let worktree_root = repo.workdir().unwrap().to_path_buf();
        let wt = WorktreeId::new("");
        std::fs::write(worktree_root.join("a.txt"), b"checkpoint-content").unwrap();
        let (_name, shadow_oid) = entire_git::snapshot_worktree_to_shadow(&repo, base, &wt, &worktree_root).unwrap();

        let mut session = Session::new(SessionId::new("2026-08-01-a"), AgentKind::Generic, wt.clone(), base.to_string());
        session.record_attribution(attribution(0, ""));
        let mut inputs = vec![CondenseSession {
            session: &mut session,
            transcript_offset: 1,
            transcript_uuid: None,
            transcript_tail: Vec::new(),
        }];
        let checkpoint = condense(&repo, &wt, &base.to_string(), shadow_oid, &mut inputs).unwrap();

        std::fs::write(worktree_root.join("a.txt"), b"edited after checkpoint").unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let transcript_path = scratch.path().join("transcript.jsonl");
        std::fs::write(&transcript_path, "{\"uuid\":\"x\"}\n{\"uuid\":\"y\"}\n").unwrap();

        let decoder = get_decoder(AgentKind::Generic);
        rewind(&repo, decoder, &transcript_path, &worktree_root, &wt, &mut session, &checkpoint, RewindMode::LogsOnly).unwrap();

        assert_eq!(std::fs::read(worktree_root.join("a.txt")).unwrap(), b"edited after checkpoint");
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id(), base);
    }
}
