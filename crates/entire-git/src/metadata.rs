//! Checkpoint metadata storage: committed onto the `entire/checkpoints/v1`
//! orphan ref as a sharded tree of git objects rather than written to the
//! filesystem, so condensed checkpoints travel with `git push`/`git fetch`
//! the same way the user's own history does.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use entire_paths::CHECKPOINTS_INDEX_REF;
use git2::{Oid, Repository};

use crate::errors::GitError;
use crate::shadow::shadow_signature;

fn metadata_ref() -> String {
    format!("refs/{CHECKPOINTS_INDEX_REF}")
}

/// One file to write (or overwrite) under a checkpoint's sharded
/// directory on the metadata ref.
pub struct CheckpointBlob {
    pub relative_path: PathBuf,
    pub content: Vec<u8>,
}

/// Commit a set of checkpoint blobs onto the metadata ref, layered on top
/// of its current tip tree (if any) so earlier checkpoints' blobs are
/// preserved rather than replaced.
pub fn commit_checkpoint_blobs(repo: &Repository, blobs: &[CheckpointBlob]) -> Result<Oid, GitError> {
    let parent_commit = repo
        .find_reference(&metadata_ref())
        .ok()
        .and_then(|r| r.target())
        .and_then(|oid| repo.find_commit(oid).ok());
    let base_tree = parent_commit.as_ref().map(|c| c.tree()).transpose()?;

    let mut files: BTreeMap<PathBuf, Vec<u8>> = BTreeMap::new();
    for blob in blobs {
        files.insert(blob.relative_path.clone(), blob.content.clone());
    }

    let tree_oid = overlay_tree(repo, base_tree.as_ref(), &files)?;
    let tree = repo.find_tree(tree_oid)?;
    let sig = shadow_signature()?;

    let parents: Vec<&git2::Commit> = parent_commit.iter().collect();
    let commit_oid = repo.commit(None, &sig, &sig, "entire: condense checkpoint", &tree, &parents)?;

    repo.reference(&metadata_ref(), commit_oid, true, "entire: condense checkpoint")?;
    Ok(commit_oid)
}

/// Build a new tree starting from `base` (if any) and inserting/replacing
/// the given files, recursing into subdirectories so siblings at every
/// level of an existing tree survive the overlay.
fn overlay_tree(
    repo: &Repository,
    base: Option<&git2::Tree>,
    files: &BTreeMap<PathBuf, Vec<u8>>,
) -> Result<Oid, GitError> {
    let mut builder = repo.treebuilder(base)?;
    let mut subdirs: BTreeMap<String, BTreeMap<PathBuf, Vec<u8>>> = BTreeMap::new();

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
            subdirs.entry(first).or_default().insert(rest, content.clone());
        }
    }

    for (name, sub_files) in subdirs {
        let sub_base = base
            .and_then(|t| t.get_name(&name))
            .and_then(|e| e.to_object(repo).ok())
            .and_then(|o| o.into_tree().ok());
        let sub_tree_oid = overlay_tree(repo, sub_base.as_ref(), &sub_files)?;
        builder.insert(&name, sub_tree_oid, git2::FileMode::Tree.into())?;
    }

    Ok(builder.write()?)
}

/// Read a single blob out of the checkpoint metadata ref's current tree.
pub fn read_checkpoint_blob(repo: &Repository, relative_path: &Path) -> Result<Option<Vec<u8>>, GitError> {
    let Ok(r) = repo.find_reference(&metadata_ref()) else {
        return Ok(None);
    };
    let Some(oid) = r.target() else { return Ok(None) };
    let commit = repo.find_commit(oid)?;
    let tree = commit.tree()?;
    match tree.get_path(relative_path) {
        Ok(entry) => {
            let object = entry.to_object(repo)?;
            let blob = object.as_blob().ok_or_else(|| GitError::ObjectStoreIo {
                message: format!("{} is not a blob", relative_path.display()),
            })?;
            Ok(Some(blob.content().to_vec()))
        }
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(GitError::Git2(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_repo_with_commit;

    #[test]
    fn commit_then_read_blob_round_trips() {
        let (_dir, repo, _base) = init_repo_with_commit();
        commit_checkpoint_blobs(
            &repo,
            &[CheckpointBlob {
                relative_path: PathBuf::from("ab/cdef/metadata.json"),
                content: b"{}".to_vec(),
            }],
        )
        .unwrap();

        let read = read_checkpoint_blob(&repo, Path::new("ab/cdef/metadata.json")).unwrap();
        assert_eq!(read, Some(b"{}".to_vec()));
    }

    #[test]
    fn later_checkpoints_do_not_clobber_earlier_siblings() {
        let (_dir, repo, _base) = init_repo_with_commit();
        commit_checkpoint_blobs(
            &repo,
            &[CheckpointBlob {
                relative_path: PathBuf::from("ab/one/metadata.json"),
                content: b"one".to_vec(),
            }],
        )
        .unwrap();
        commit_checkpoint_blobs(
            &repo,
            &[CheckpointBlob {
                relative_path: PathBuf::from("ab/two/metadata.json"),
                content: b"two".to_vec(),
            }],
        )
        .unwrap();

        assert_eq!(
            read_checkpoint_blob(&repo, Path::new("ab/one/metadata.json")).unwrap(),
            Some(b"one".to_vec())
        );
        assert_eq!(
            read_checkpoint_blob(&repo, Path::new("ab/two/metadata.json")).unwrap(),
            Some(b"two".to_vec())
        );
    }

    #[test]
    fn missing_ref_reads_back_none() {
        let (_dir, repo, _base) = init_repo_with_commit();
        assert_eq!(read_checkpoint_blob(&repo, Path::new("ab/cd/metadata.json")).unwrap(), None);
    }
}
