//! Stable identifiers for sessions, checkpoints, and worktrees.
//!
//! Generate a newtype wrapper around `String` with the standard trait
//! impls every identifier in this crate needs: `Debug`, `Clone`,
//! `PartialEq`, `Eq`, `Hash`, `Serialize`/`Deserialize` (transparent),
//! `Display`, `Deref<Target=str>`, `AsRef<str>`, `From<String>`, `From<&str>`.
macro_rules! newtype_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

newtype_string! {
    /// A session's stable identifier: `YYYY-MM-DD-<agent-uuid>`.
    ///
    /// The date prefix is added once, at `PromptStart`, from the agent's raw
    /// conversation UUID. See [`SessionId::from_raw_agent_id`] and
    /// [`SessionId::raw_agent_id`].
    SessionId
}

newtype_string! {
    /// Git's stable per-worktree identifier (empty string for the main worktree).
    WorktreeId
}

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("session id must not contain '/' or '..' and must be at most {max} characters, got {len}")]
    InvalidSessionId { len: usize, max: usize },

    #[error("checkpoint id must be exactly 12 lowercase hex characters, got '{value}'")]
    InvalidCheckpointId { value: String },
}

const MAX_SESSION_ID_LEN: usize = 200;

impl SessionId {
    /// Build a session ID by prefixing a raw agent-supplied conversation UUID
    /// with today's date: `YYYY-MM-DD-<raw>`.
    pub fn from_raw_agent_id(raw: &str, today: chrono::NaiveDate) -> Self {
        Self(format!("{}-{raw}", today.format("%Y-%m-%d")))
    }

    /// Recover the raw agent-supplied UUID this session ID was derived from.
    ///
    /// Reversible: positions 4, 7, and 10 must hold the dashes of a
    /// `YYYY-MM-DD-` prefix, in which case everything from the 11th
    /// character on is returned. Inputs too short to carry that prefix pass
    /// through unchanged.
    pub fn raw_agent_id(&self) -> &str {
        let bytes = self.0.as_bytes();
        let has_date_prefix = self.0.len() > 11
            && bytes.get(4) == Some(&b'-')
            && bytes.get(7) == Some(&b'-')
            && bytes.get(10) == Some(&b'-');
        if has_date_prefix {
            &self.0[11..]
        } else {
            &self.0
        }
    }

    /// Validate that this ID is safe to use as a path component: no
    /// separators, no traversal, bounded length.
    pub fn validate(&self) -> Result<(), IdError> {
        if self.0.is_empty()
            || self.0.len() > MAX_SESSION_ID_LEN
            || self.0.contains('/')
            || self.0.contains('\\')
            || self.0.contains("..")
        {
            return Err(IdError::InvalidSessionId {
                len: self.0.len(),
                max: MAX_SESSION_ID_LEN,
            });
        }
        Ok(())
    }
}

impl WorktreeId {
    /// A deterministic 6-hex-character digest of this worktree ID, used in
    /// shadow branch names. Empty worktree IDs (the main worktree) hash the
    /// same way as any other string — callers that want a stable "main
    /// worktree" shadow name rely on this being consistent across runs, not
    /// on any special-casing here.
    pub fn short_hash(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        format!("{:06x}", hasher.finish() & 0xFF_FFFF)
    }
}

/// A condensed checkpoint's content-derived identifier: 12 lowercase hex
/// characters, stable across repeated condensations of the same sessions
/// .
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

const CHECKPOINT_ID_LEN: usize = 12;

impl CheckpointId {
    /// The sentinel value representing "no checkpoint yet" (e.g. a fresh
    /// session's `last_checkpoint_id`).
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a 12-character lowercase hex checkpoint ID.
    pub fn from_hex(value: &str) -> Result<Self, IdError> {
        let valid = value.len() == CHECKPOINT_ID_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(IdError::InvalidCheckpointId {
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// Truncate a full hex digest (e.g. a SHA-256 hex string) down to a
    /// checkpoint ID. Callers are responsible for ensuring `digest` is at
    /// least [`CHECKPOINT_ID_LEN`] hex characters long and lowercase.
    pub fn from_digest_prefix(digest: &str) -> Self {
        Self(digest[..CHECKPOINT_ID_LEN].to_string())
    }

    pub fn string(&self) -> &str {
        &self.0
    }

    /// The two-level shard prefix and suffix this ID's metadata lives
    /// under: `<id[:2]>/<id[2:]>`.
    pub fn path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.0[..2]).join(&self.0[2..])
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    #[test]
    fn session_id_round_trip() {
        let id = SessionId::from_raw_agent_id("550e8400-e29b-41d4-a716-446655440000", date());
        assert_eq!(id.as_str(), "2026-08-01-550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(id.raw_agent_id(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn session_id_round_trip_short_uuid() {
        let id = SessionId::from_raw_agent_id("abc", date());
        assert_eq!(id.raw_agent_id(), "abc");
    }

    #[test]
    fn extract_passes_through_short_input_unchanged() {
        let id = SessionId::new("short");
        assert_eq!(id.raw_agent_id(), "short");
    }

    #[test]
    fn extract_passes_through_non_dated_input_unchanged() {
        let id = SessionId::new("not-a-dated-session-id-at-all");
        assert_eq!(id.raw_agent_id(), "not-a-dated-session-id-at-all");
    }

    #[test]
    fn session_id_rejects_path_traversal() {
        assert!(SessionId::new("../../etc/passwd").validate().is_err());
        assert!(SessionId::new("a/b").validate().is_err());
        assert!(SessionId::new("").validate().is_err());
        assert!(SessionId::new("2026-08-01-fine").validate().is_ok());
    }

    #[test]
    fn session_id_rejects_overlong() {
        let long = "a".repeat(MAX_SESSION_ID_LEN + 1);
        assert!(SessionId::new(long).validate().is_err());
    }

    #[test]
    fn worktree_short_hash_is_deterministic() {
        let a = WorktreeId::new("/repo/.git/worktrees/foo");
        let b = WorktreeId::new("/repo/.git/worktrees/foo");
        let c = WorktreeId::new("/repo/.git/worktrees/bar");
        assert_eq!(a.short_hash(), b.short_hash());
        assert_ne!(a.short_hash(), c.short_hash());
        assert_eq!(a.short_hash().len(), 6);
    }

    #[test]
    fn checkpoint_id_from_digest_prefix() {
        let digest = "0123456789abcdef0123456789abcdef";
        let id = CheckpointId::from_digest_prefix(digest);
        assert_eq!(id.string(), "0123456789ab");
    }

    #[test]
    fn checkpoint_id_validates_hex() {
        assert!(CheckpointId::from_hex("0123456789ab").is_ok());
        assert!(CheckpointId::from_hex("0123456789AB").is_err());
        assert!(CheckpointId::from_hex("short").is_err());
        assert!(CheckpointId::from_hex("0123456789abcd").is_err());
    }

    #[test]
    fn checkpoint_id_empty_sentinel() {
        let empty = CheckpointId::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.string(), "");
    }

    #[test]
    fn checkpoint_id_path_is_sharded() {
        let id = CheckpointId::from_hex("0123456789ab").unwrap();
        assert_eq!(id.path(), std::path::PathBuf::from("01/23456789ab"));
    }
}
