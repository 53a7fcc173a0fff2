//! Shadow branch naming: derivation and classification of the refs the
//! checkpoint engine uses to snapshot a worktree without touching the
//! user's branches.

use crate::ids::WorktreeId;

/// Prefix every shadow branch lives under, so a single glob
/// (`entire/*`) finds them all and `git branch` never shows the user's
/// own branches mixed in.
pub const SHADOW_REF_PREFIX: &str = "entire/";

/// The metadata ref checkpoints are indexed under. It shares the
/// `entire/` prefix but is never itself a shadow snapshot, so
/// classification must exclude it explicitly.
pub const CHECKPOINTS_INDEX_REF: &str = "entire/checkpoints/v1";

/// A shadow branch name: `entire/<base[:7]>-<worktree[:6]>`.
///
/// Earlier versions of this layout wrote the legacy form
/// `entire/<base[:7]>` with no worktree suffix. Both forms are still
/// recognized on read; only the worktree-scoped form is written going
/// forward (kept both read forms rather than migrating
/// existing shadow branches on first touch, since migration would mean
/// rewriting refs on every repo this runs against for no behavioral gain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowRefName(String);

impl ShadowRefName {
    /// Derive the current (worktree-scoped) shadow branch name for a base
    /// commit and worktree.
    pub fn derive(base_commit_hex: &str, worktree: &WorktreeId) -> Self {
        let base_short = &base_commit_hex[..base_commit_hex.len().min(7)];
        Self(format!(
            "{SHADOW_REF_PREFIX}{base_short}-{}",
            worktree.short_hash()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already-validated shadow ref short name (e.g. one just read
    /// back from the repository) without re-deriving it. Returns `None` if
    /// `ref_name` does not classify as a shadow ref.
    pub fn from_existing(ref_name: &str) -> Option<Self> {
        Self::classify(ref_name)?;
        Some(Self(ref_name.to_string()))
    }

    /// Classify an arbitrary ref name, returning `Some` with the parsed
    /// form if it is a shadow branch (either naming generation).
    pub fn classify(ref_name: &str) -> Option<ShadowKind> {
        if ref_name == CHECKPOINTS_INDEX_REF {
            return None;
        }
        let suffix = ref_name.strip_prefix(SHADOW_REF_PREFIX)?;
        if suffix.is_empty() {
            return None;
        }

        if let Some((base, worktree)) = suffix.split_once('-') {
            if is_hex(base, 7, usize::MAX) && is_hex(worktree, 6, 6) {
                return Some(ShadowKind::WorktreeScoped {
                    base_prefix: base.to_string(),
                    worktree_hash: worktree.to_string(),
                });
            }
        }

        if is_hex(suffix, 7, usize::MAX) {
            return Some(ShadowKind::Legacy {
                base_prefix: suffix.to_string(),
            });
        }

        None
    }

    pub fn is_shadow_ref(ref_name: &str) -> bool {
        Self::classify(ref_name).is_some()
    }
}

impl std::fmt::Display for ShadowRefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The two shadow branch naming generations, distinguished on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowKind {
    WorktreeScoped {
        base_prefix: String,
        worktree_hash: String,
    },
    Legacy {
        base_prefix: String,
    },
}

fn is_hex(s: &str, min_len: usize, max_len: usize) -> bool {
    s.len() >= min_len && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_hexdigit())
}
