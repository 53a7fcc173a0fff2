//! Line attribution: splitting a turn's diff into user-authored and
//! agent-authored lines.
//!
//! The diff itself can't tell a user-typed line from an agent-written one —
//! both land in the working tree the same way. What's knowable is how many
//! lines the user touched directly (tracked separately, e.g. from editor
//! save events or `PreToolUse`/`PostToolUse` boundaries the caller already
//! distinguishes). Reconciliation debits that known count from the diff's
//! total added lines first; whatever remains is credited to the agent.
//! This keeps the algorithm stable even when the user's direct edit count
//! is itself approximate.

use std::collections::{BTreeMap, BTreeSet};

use git2::{Diff, Repository, Tree};

use crate::errors::CoreResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_touched: Vec<String>,
    /// Per-file (added, removed) line counts; a line-similarity match
    /// within a file (`min(added, removed)`) stands in for "modified"
    /// since Git's own diff only classifies lines as added or removed.
    pub per_file: BTreeMap<String, (u64, u64)>,
}

fn diff_stats(repo: &Repository, old_tree: Option<&Tree>, new_tree: &Tree) -> CoreResult<DiffStats> {
    let diff: Diff = repo.diff_tree_to_tree(old_tree, Some(new_tree), None)?;

    let mut added = 0u64;
    let mut removed = 0u64;
    let mut files = BTreeSet::new();
    let mut per_file: BTreeMap<String, (u64, u64)> = BTreeMap::new();

    diff.foreach(
        &mut |delta, _progress| {
            if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                files.insert(path.to_string_lossy().into_owned());
            }
            true
        },
        None,
        None,
        Some(&mut |delta, _hunk, line| {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let entry = per_file.entry(path).or_insert((0, 0));
            match line.origin() {
                '+' => {
                    added += 1;
                    entry.0 += 1;
                }
                '-' => {
                    removed += 1;
                    entry.1 += 1;
                }
                _ => {}
            }
            true
        }),
    )?;

    Ok(DiffStats {
        lines_added: added,
        lines_removed: removed,
        files_touched: files.into_iter().collect(),
        per_file,
    })
}

/// Reconciled split of a turn's diff between user and agent authorship.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub human_added: u64,
    pub human_modified: u64,
    pub human_removed: u64,
    pub agent_lines_added: u64,
    pub total_committed: u64,
    /// Percentage (0-100) of `total_committed` attributed to the agent.
    pub agent_percentage: u8,
    pub files_touched: Vec<String>,
    /// Retained name some callers still use for `human_added`.
    pub user_lines_added: u64,
    pub lines_removed: u64,
}

/// Compute the diff between two tree states and reconcile it against a
/// known count of user-authored added lines.
///
/// Line-level authorship can't be read off the diff directly — both a
/// user's keystrokes and an agent's file write land in the tree the same
/// way. What's knowable is how many added lines the caller already traced
/// to the user (editor saves, `PreToolUse`/`PostToolUse` boundaries); this
/// debits that count from the raw added-line total first; whatever remains
/// is credited to the agent. Per-file, later edits that land on a file the
/// user already added lines to are credited back to the user as
/// `human_modified`, up to the number of lines the user added there, so an
/// agent's cleanup pass over a user's own edit doesn't get attributed away
/// from them.
pub fn attribute_turn(
    repo: &Repository,
    old_tree: Option<&Tree>,
    new_tree: &Tree,
    known_user_lines_added: u64,
) -> CoreResult<Reconciled> {
    let stats = diff_stats(repo, old_tree, new_tree)?;

    let mut remaining_user_added = known_user_lines_added.min(stats.lines_added);
    let user_added_total = remaining_user_added;
    let mut human_modified = 0u64;

    // Distribute the user's added-line budget across files in a stable
    // (sorted-path) order, crediting modified lines in the same file back
    // to the user up to what they added there.
    for (_, (added, removed)) in stats.per_file.iter() {
        if remaining_user_added == 0 {
            break;
        }
        let user_added_here = remaining_user_added.min(*added);
        let modified_here = (*added).min(*removed).min(user_added_here);
        human_modified += modified_here;
        remaining_user_added -= user_added_here;
    }

    let human_added = user_added_total;
    let agent_lines_added = stats.lines_added.saturating_sub(human_added);
    let total_committed = human_added + agent_lines_added;
    let agent_percentage = if total_committed == 0 {
        0
    } else {
        ((agent_lines_added.saturating_sub(human_modified)) * 100 / total_committed) as u8
    };

    Ok(Reconciled {
        human_added,
        human_modified,
        human_removed: stats.lines_removed,
        agent_lines_added,
        total_committed,
        agent_percentage,
        files_touched: stats.files_touched,
        user_lines_added: human_added,
        lines_removed: stats.lines_removed,
    })
}
