//! In-memory and on-disk shape of a live checkpoint session: one per
//! `(worktree, agent conversation)` pair, from its first prompt until its
//! last turn is condensed into a checkpoint and the shadow branch is
//! retired.

use chrono::{DateTime, Utc};
use entire_paths::{CheckpointId, SessionId, WorktreeId};
use entire_protocol::AgentKind;
use serde::{Deserialize, Serialize};

/// Where a session sits in the checkpoint lifecycle. An empty string deserializes as `Idle` for
/// backward-compatibility with state files written before this field
/// existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No turn in progress; the shadow branch (if any) holds only
    /// already-snapshotted, not-yet-condensed content.
    Idle,
    /// Between `PromptStart` and the matching `TurnEnd`.
    Active,
    /// The session's worktree was removed or its branch deleted; retained
    /// for inspection but no longer accepts events.
    Ended,
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Per-prompt line attribution, reconciled once a turn ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptAttribution {
    pub sequence: u32,
    #[serde(default)]
    pub prompt_text: String,
    pub user_lines_added: u64,
    pub agent_lines_added: u64,
    /// Lines the diff counts as added but that reconciliation credits back
    /// to the user as a replacement of their own earlier edit, rather than
    /// new agent authorship. See `attribution::Reconciled::human_modified`.
    #[serde(default)]
    pub human_modified: u64,
    pub lines_removed: u64,
    #[serde(default)]
    pub files_touched: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// A live session: state that persists across hook invocations for one
/// worktree's conversation with one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent: AgentKind,
    pub worktree: WorktreeId,
    /// Hex OID of the commit the session's shadow branch is based on.
    pub base_commit: String,
    /// Hex OID attribution is computed against. Equal to `base_commit`
    /// except in the window between a condensing commit landing and
    /// `post-commit` advancing both; kept distinct so a commit that fails
    /// partway through condensation doesn't silently re-attribute lines
    /// against the wrong parent.
    #[serde(default)]
    pub attribution_base_commit: String,
    /// Untracked paths present in the worktree when the session started,
    /// so a full rewind can recreate them instead of leaving them gone.
    #[serde(default)]
    pub untracked_files_at_start: Vec<String>,
    /// Union of every file touched across all turns since the last
    /// condensation, independent of any one `PromptAttribution`'s own list.
    #[serde(default)]
    pub files_touched: Vec<String>,
    #[serde(default)]
    pub step_count: u64,
    /// The session's first user prompt, truncated for display purposes.
    #[serde(default)]
    pub first_prompt: String,
    /// Path to the agent's transcript file for this session, as reported
    /// by its hook payloads. Read at condensation time to capture the
    /// turns' raw content alongside their attribution.
    #[serde(default)]
    pub transcript_path: Option<String>,
    pub phase: SessionPhase,
    #[serde(default)]
    pub attributions: Vec<PromptAttribution>,
    #[serde(default = "CheckpointId::empty")]
    pub last_checkpoint_id: CheckpointId,
    /// Authoritative scoping position for the next condensation: the
    /// number of transcript lines already folded into `last_checkpoint_id`.
    /// Kept alongside `last_checkpoint_uuid` because the uuid survives a
    /// transcript file being rewritten out from under a stale offset, while
    /// the offset is what lets an empty or not-yet-tagged transcript line
    /// still scope correctly.
    #[serde(default)]
    pub last_checkpoint_transcript_offset: usize,
    #[serde(default)]
    pub last_checkpoint_transcript_uuid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, agent: AgentKind, worktree: WorktreeId, base_commit: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            agent,
            worktree,
            attribution_base_commit: base_commit.clone(),
            base_commit,
            untracked_files_at_start: Vec::new(),
            files_touched: Vec::new(),
            step_count: 0,
            first_prompt: String::new(),
            transcript_path: None,
            phase: SessionPhase::Active,
            attributions: Vec::new(),
            last_checkpoint_id: CheckpointId::empty(),
            last_checkpoint_transcript_offset: 0,
            last_checkpoint_transcript_uuid: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[cfg(test)]
    pub fn new_for_test(id: &str) -> Self {
        Self::new(
            SessionId::new(id),
            AgentKind::Generic,
            WorktreeId::new(""),
            "0".repeat(40),
        )
    }

    pub fn record_attribution(&mut self, attribution: PromptAttribution) {
        for file in &attribution.files_touched {
            if !self.files_touched.iter().any(|f| f == file) {
                self.files_touched.push(file.clone());
            }
        }
        self.step_count += 1;
        self.attributions.push(attribution);
        self.updated_at = Utc::now();
    }

    /// `TurnEnd`: the shadow snapshot for this turn has been taken: go back
    /// to `Idle` until the next prompt or a commit condenses what's pending.
    pub fn end_turn(&mut self) {
        self.phase = SessionPhase::Idle;
        self.updated_at = Utc::now();
    }

    /// `PromptStart` on an `Idle` session.
    pub fn start_turn(&mut self) {
        self.phase = SessionPhase::Active;
        self.updated_at = Utc::now();
    }

    pub fn mark_condensed(
        &mut self,
        checkpoint_id: CheckpointId,
        transcript_offset: usize,
        transcript_uuid: Option<String>,
    ) {
        self.last_checkpoint_id = checkpoint_id;
        self.last_checkpoint_transcript_offset = transcript_offset;
        self.last_checkpoint_transcript_uuid = transcript_uuid;
        self.attributions.clear();
        self.phase = SessionPhase::Idle;
        self.updated_at = Utc::now();
    }

    pub fn close(&mut self) {
        self.phase = SessionPhase::Ended;
        self.updated_at = Utc::now();
    }

    pub fn pending_attribution_count(&self) -> usize {
        self.attributions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_active_with_no_checkpoint() {
        let session = Session::new_for_test("s1");
        assert_eq!(session.phase, SessionPhase::Active);
        assert!(session.last_checkpoint_id.is_empty());
    }

    #[test]
    fn ending_a_turn_returns_to_idle_and_keeps_pending_attributions() {
        let mut session = Session::new_for_test("s1");
        session.record_attribution(PromptAttribution {
            sequence: 0,
            prompt_text: "do the thing".into(),
            user_lines_added: 3,
            agent_lines_added: 10,
            human_modified: 0,
            lines_removed: 1,
            files_touched: vec!["a.rs".into()],
            recorded_at: Utc::now(),
        });
        session.end_turn();
        assert_eq!(session.phase, SessionPhase::Idle);
        assert_eq!(session.pending_attribution_count(), 1);
        assert_eq!(session.files_touched, vec!["a.rs".to_string()]);
    }

    #[test]
    fn marking_condensed_clears_pending_attributions() {
        let mut session = Session::new_for_test("s1");
        session.record_attribution(PromptAttribution {
            sequence: 0,
            prompt_text: String::new(),
            user_lines_added: 1,
            agent_lines_added: 1,
            human_modified: 0,
            lines_removed: 0,
            files_touched: vec![],
            recorded_at: Utc::now(),
        });
        let checkpoint_id = CheckpointId::from_hex("0123456789ab").unwrap();
        session.mark_condensed(checkpoint_id.clone(), 5, Some("uuid-5".into()));
        assert_eq!(session.last_checkpoint_id, checkpoint_id);
        assert_eq!(session.last_checkpoint_transcript_offset, 5);
        assert_eq!(session.pending_attribution_count(), 0);
        assert_eq!(session.phase, SessionPhase::Idle);
    }
}
