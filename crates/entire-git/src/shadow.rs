//! Shadow branch snapshots: content-only commits that mirror a worktree's
//! current files without ever touching the user's branches, index, or HEAD.
//!
//! Shadow refs live under `refs/entire/*`, outside `refs/heads/*`, so they
//! never show up in `git branch` and never collide with user-created refs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use entire_paths::{ShadowKind, ShadowRefName, WorktreeId, CHECKPOINTS_INDEX_REF};
use git2::{Oid, Repository};

use crate::errors::GitError;

const LOCK_RETRY_ATTEMPTS: u32 = 3;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Retry a git2 operation a bounded number of times when it fails because
/// another process holds the repository's reference lock. Any other error
/// propagates immediately.
fn with_lock_retry<T>(mut op: impl FnMut() -> Result<T, git2::Error>) -> Result<T, GitError> {
    let mut last_err = None;
    for attempt in 0..LOCK_RETRY_ATTEMPTS {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.code() == git2::ErrorCode::Locked => {
                tracing::warn!(
                    event = "git.shadow.lock_contended",
                    attempt,
                    "reference lock held by another process, retrying"
                );
                last_err = Some(e);
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
            Err(e) => return Err(GitError::Git2(e)),
        }
    }
    tracing::error!(
        event = "git.shadow.lock_exhausted",
        attempts = LOCK_RETRY_ATTEMPTS,
        "giving up after repeated lock contention"
    );
    let _ = last_err;
    Err(GitError::ObjectStoreBusy {
        attempts: LOCK_RETRY_ATTEMPTS,
    })
}

fn full_ref_name(shadow: &ShadowRefName) -> String {
    format!("refs/{shadow}")
}

/// Walk `worktree_root` respecting `.gitignore` and build a git tree object
/// from its current contents, skipping `.git` itself.
fn build_tree_from_workdir(repo: &Repository, worktree_root: &Path) -> Result<Oid, GitError> {
    let mut files: Vec<(PathBuf, Vec<u8>)> = Vec::new();
    let walker = ignore::WalkBuilder::new(worktree_root).hidden(false).build();
    for entry in walker {
        let entry = entry.map_err(|e| GitError::ObjectStoreIo {
            message: e.to_string(),
        })?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(worktree_root)
            .unwrap_or(entry.path())
            .to_path_buf();
        if rel
            .components()
            .next()
            .is_some_and(|c| c.as_os_str() == ".git")
        {
            continue;
        }
        let content = std::fs::read(entry.path())?;
        files.push((rel, content));
    }
    build_tree_recursive(repo, &files)
}

fn build_tree_recursive(repo: &Repository, files: &[(PathBuf, Vec<u8>)]) -> Result<Oid, GitError> {
    let mut builder = repo.treebuilder(None)?;
    let mut subdirs: BTreeMap<String, Vec<(PathBuf, Vec<u8>)>> = BTreeMap::new();

    for (path, content) in files {
        let mut components = path.components();
        let Some(first) = components.next() else {
            continue;
        };
        let first = first.as_os_str().to_string_lossy().into_owned();
        let rest: PathBuf = components.collect();
        if rest.as_os_str().is_empty() {
            let blob_oid = repo.blob(content)?;
            builder.insert(&first, blob_oid, git2::FileMode::Blob.into())?;
        } else {
            subdirs.entry(first).or_default().push((rest, content.clone()));
        }
    }

    for (name, sub_files) in subdirs {
        let sub_tree_oid = build_tree_recursive(repo, &sub_files)?;
        builder.insert(&name, sub_tree_oid, git2::FileMode::Tree.into())?;
    }

    Ok(builder.write()?)
}

pub(crate) fn shadow_signature() -> Result<git2::Signature<'static>, GitError> {
    Ok(git2::Signature::now("entire", "entire@localhost")?)
}

/// Snapshot a worktree's current files into a shadow commit whose parent is
/// `base_commit`, and force the shadow ref to point at it. Returns the
/// shadow ref name and the new commit's OID.
pub fn snapshot_worktree_to_shadow(
    repo: &Repository,
    base_commit: Oid,
    worktree: &WorktreeId,
    worktree_root: &Path,
) -> Result<(ShadowRefName, Oid), GitError> {
    let base = repo
        .find_commit(base_commit)
        .map_err(|_| GitError::BaseCommitNotFound {
            oid: base_commit.to_string(),
        })?;
    let tree_oid = build_tree_from_workdir(repo, worktree_root)?;
    let tree = repo.find_tree(tree_oid)?;
    let sig = shadow_signature()?;
    let commit_oid = repo.commit(
        None,
        &sig,
        &sig,
        "entire: worktree snapshot",
        &tree,
        &[&base],
    )?;

    let shadow_name = ShadowRefName::derive(&base_commit.to_string(), worktree);
    let refname = full_ref_name(&shadow_name);
    with_lock_retry(|| {
        repo.reference(&refname, commit_oid, true, "entire: snapshot worktree")
            .map(|_| ())
    })?;

    Ok((shadow_name, commit_oid))
}

/// Force a shadow branch back to point directly at its base commit,
/// discarding whatever snapshot commits had accumulated on it. Used by the
/// full-reset rewind variant.
pub fn reset_shadow_to_base(
    repo: &Repository,
    base_commit: Oid,
    worktree: &WorktreeId,
) -> Result<ShadowRefName, GitError> {
    repo.find_commit(base_commit)
        .map_err(|_| GitError::BaseCommitNotFound {
            oid: base_commit.to_string(),
        })?;
    let shadow_name = ShadowRefName::derive(&base_commit.to_string(), worktree);
    let refname = full_ref_name(&shadow_name);
    with_lock_retry(|| {
        repo.reference(&refname, base_commit, true, "entire: reset to base")
            .map(|_| ())
    })?;
    Ok(shadow_name)
}

/// Re-home an in-progress shadow from `old_base` to `new_base`, for when a
/// commit lands mid-turn and the next snapshot needs a new parent.
///
/// Since `snapshot_worktree_to_shadow` always parents the shadow commit
/// directly on the base (each snapshot hard-resets the ref rather than
/// accumulating a chain), migrating it is a single re-commit: read the
/// existing shadow's tree, commit it again with `new_base` as the sole
/// parent, write it under the ref name derived from `new_base`, and drop
/// the old-named ref. If nothing had been snapshotted yet (the shadow ref
/// is absent or still points directly at `old_base`), there is nothing to
/// carry forward and the old ref (if any) is simply deleted.
pub fn migrate_shadow(
    repo: &Repository,
    old_base: Oid,
    new_base: Oid,
    worktree: &WorktreeId,
) -> Result<Option<(ShadowRefName, Oid)>, GitError> {
    let old_name = ShadowRefName::derive(&old_base.to_string(), worktree);
    let old_refname = full_ref_name(&old_name);

    let Ok(old_ref) = repo.find_reference(&old_refname) else {
        return Ok(None);
    };
    let Some(old_tip) = old_ref.target() else {
        return Ok(None);
    };

    if old_tip == old_base {
        with_lock_retry(|| repo.find_reference(&old_refname).and_then(|mut r| r.delete()))?;
        return Ok(None);
    }

    let new_base_commit = repo
        .find_commit(new_base)
        .map_err(|_| GitError::BaseCommitNotFound {
            oid: new_base.to_string(),
        })?;
    let old_commit = repo.find_commit(old_tip)?;
    let tree = old_commit.tree()?;
    let sig = shadow_signature()?;
    let new_commit_oid = repo.commit(
        None,
        &sig,
        &sig,
        "entire: migrate shadow to new base",
        &tree,
        &[&new_base_commit],
    )?;

    let new_name = ShadowRefName::derive(&new_base.to_string(), worktree);
    let new_refname = full_ref_name(&new_name);
    with_lock_retry(|| {
        repo.reference(&new_refname, new_commit_oid, true, "entire: migrate shadow")
            .map(|_| ())
    })?;
    with_lock_retry(|| repo.find_reference(&old_refname).and_then(|mut r| r.delete()))?;

    Ok(Some((new_name, new_commit_oid)))
}

/// Delete a shadow branch entirely. Used once its checkpoint has been
/// condensed and the snapshot is no longer needed.
pub fn delete_shadow(repo: &Repository, shadow: &ShadowRefName) -> Result<(), GitError> {
    let refname = full_ref_name(shadow);
    match repo.find_reference(&refname) {
        Ok(mut r) => Ok(r.delete()?),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
        Err(e) => Err(GitError::Git2(e)),
    }
}

/// List every shadow branch currently present, in either naming generation.
pub fn list_shadow_branches(repo: &Repository) -> Result<Vec<(ShadowKind, Oid)>, GitError> {
    let mut out = Vec::new();
    let refs = repo.references_glob("refs/entire/*")?;
    for r in refs {
        let r = r?;
        let Some(name) = r.name() else { continue };
        let Some(short) = name.strip_prefix("refs/") else {
            continue;
        };
        if short == CHECKPOINTS_INDEX_REF {
            continue;
        }
        let Some(kind) = ShadowRefName::classify(short) else {
            continue;
        };
        let Some(oid) = r.target() else { continue };
        out.push((kind, oid));
    }
    Ok(out)
}

/// Resolve the shadow branch for a base commit and worktree, preferring the
/// current worktree-scoped naming and falling back to the legacy
/// worktree-less form written by earlier versions.
pub fn find_shadow_for_base(
    repo: &Repository,
    base_commit: Oid,
    worktree: &WorktreeId,
) -> Result<Option<(ShadowRefName, Oid)>, GitError> {
    let current = ShadowRefName::derive(&base_commit.to_string(), worktree);
    if let Ok(r) = repo.find_reference(&full_ref_name(&current)) {
        if let Some(oid) = r.target() {
            return Ok(Some((current, oid)));
        }
    }

    let base_hex = base_commit.to_string();
    let base_short = &base_hex[..base_hex.len().min(7)];
    let legacy_short = format!("entire/{base_short}");
    let legacy_ref = format!("refs/{legacy_short}");
    match repo.find_reference(&legacy_ref) {
        Ok(r) => {
            let Some(oid) = r.target() else {
                return Ok(None);
            };
            let name = ShadowRefName::from_existing(&legacy_short).ok_or_else(|| {
                GitError::ObjectStoreIo {
                    message: format!("'{legacy_short}' is not a valid shadow ref"),
                }
            })?;
            Ok(Some((name, oid)))
        }
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(GitError::Git2(e)),
    }
}

/// Read a single file's content out of a shadow commit's tree, if present.
pub fn read_tree_file(
    repo: &Repository,
    commit: Oid,
    relative_path: &Path,
) -> Result<Option<Vec<u8>>, GitError> {
    let commit = repo.find_commit(commit)?;
    let tree = commit.tree()?;
    match tree.get_path(relative_path) {
        Ok(entry) => {
            let object = entry.to_object(repo)?;
            let blob = object
                .as_blob()
                .ok_or_else(|| GitError::ObjectStoreIo {
                    message: format!("{} is not a blob", relative_path.display()),
                })?;
            Ok(Some(blob.content().to_vec()))
        }
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(GitError::Git2(e)),
    }
}

/// Overwrite `worktree_root` so its tracked-by-`.gitignore` contents match
/// `commit`'s tree exactly: files absent from the tree are deleted, files
/// present are written with the tree's content. Used by the full rewind
/// variant to restore a worktree to an earlier checkpoint's snapshot.
pub fn restore_workdir_from_tree(
    repo: &Repository,
    commit: Oid,
    worktree_root: &Path,
) -> Result<(), GitError> {
    let commit = repo.find_commit(commit)?;
    let tree = commit.tree()?;

    let mut target_files: BTreeMap<PathBuf, Oid> = BTreeMap::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            let name = entry.name().unwrap_or_default();
            target_files.insert(PathBuf::from(root).join(name), entry.id());
        }
        git2::TreeWalkResult::Ok
    })?;

    let walker = ignore::WalkBuilder::new(worktree_root).hidden(false).build();
    for entry in walker {
        let entry = entry.map_err(|e| GitError::ObjectStoreIo {
            message: e.to_string(),
        })?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(worktree_root)
            .unwrap_or(entry.path())
            .to_path_buf();
        if rel.components().next().is_some_and(|c| c.as_os_str() == ".git") {
            continue;
        }
        if !target_files.contains_key(&rel) {
            let _ = std::fs::remove_file(entry.path());
        }
    }

    for (rel, oid) in &target_files {
        let blob = repo.find_blob(*oid)?;
        let dest = worktree_root.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, blob.content())?;
    }

    Ok(())
}
