//! Test-only helpers for building throwaway repositories with git2
//! directly, without shelling out to the `git` binary.

use git2::Repository;
use tempfile::TempDir;

/// Initialize a repository with one commit on its default branch and an
/// empty tree, returning the tempdir (kept alive for the caller), the
/// opened repository, and the commit's OID.
pub fn init_repo_with_commit() -> (TempDir, Repository, git2::Oid) {
    let dir = TempDir::new().expect("create tempdir");
    let repo = Repository::init(dir.path()).expect("init repo");

    let sig = git2::Signature::now("test", "test@example.com").unwrap();
    let tree_oid = {
        let builder = repo.treebuilder(None).unwrap();
        builder.write().unwrap()
    };
    let commit_oid = {
        let tree = repo.find_tree(tree_oid).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial commit", &tree, &[])
            .unwrap()
    };

    (dir, repo, commit_oid)
}
