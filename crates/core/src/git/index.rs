//! Index mutation and commit creation.

use std::path::{Path, PathBuf};

use git2::{Commit, Index, Repository, Signature};
use tracing::{debug, info, instrument, warn};

use super::{is_unborn, open, workdir_relative};
use crate::context::RepositoryContext;
use crate::errors::GitError;
use crate::models::Identity;

pub(crate) fn is_indexed(ctx: &RepositoryContext, path: &Path) -> Result<bool, GitError> {
    let repo = open(ctx)?;
    let index = repo.index()?;
    let relative = workdir_relative(&repo, path);
    Ok(index.get_path(&relative, 0).is_some())
}

/// Stage one path: add it when it exists on disk, drop it when it was
/// deleted from the working tree. A path that is neither on disk nor
/// indexed is an error.
fn stage_path(repo: &Repository, index: &mut Index, path: &Path) -> Result<(), git2::Error> {
    let relative = workdir_relative(repo, path);
    let on_disk = repo
        .workdir()
        .map(|root| root.join(&relative).exists())
        .unwrap_or(false);
    if on_disk {
        index.add_path(&relative)
    } else if index.get_path(&relative, 0).is_some() {
        index.remove_path(&relative)
    } else {
        Err(git2::Error::from_str("path does not exist"))
    }
}

/// Batch add. The index is written once, after every path was attempted.
#[instrument(skip(ctx, paths), fields(count = paths.len()))]
pub(crate) fn add_paths(ctx: &RepositoryContext, paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError> {
    let repo = open(ctx)?;
    let mut index = repo.index()?;
    let mut failed = Vec::new();

    for path in paths {
        let relative = workdir_relative(&repo, path);
        if let Err(e) = index.add_path(&relative) {
            warn!(path = %relative.display(), error = %e, "could not add to index");
            failed.push(path.clone());
        }
    }
    index.write()?;
    info!(added = paths.len() - failed.len(), failed = failed.len(), "index add pass done");
    Ok(failed)
}

/// Batch remove. The index is written once, after every path was attempted.
#[instrument(skip(ctx, paths), fields(count = paths.len()))]
pub(crate) fn remove_paths(ctx: &RepositoryContext, paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError> {
    let repo = open(ctx)?;
    let mut index = repo.index()?;
    let mut failed = Vec::new();

    for path in paths {
        let relative = workdir_relative(&repo, path);
        if let Err(e) = index.remove_path(&relative) {
            warn!(path = %relative.display(), error = %e, "could not remove from index");
            failed.push(path.clone());
        }
    }
    index.write()?;
    info!(removed = paths.len() - failed.len(), failed = failed.len(), "index remove pass done");
    Ok(failed)
}

/// Stage `paths`, write the tree and commit it on HEAD.
#[instrument(skip(ctx, paths, message), fields(count = paths.len(), author = %identity.name))]
pub(crate) fn commit(
    ctx: &RepositoryContext,
    paths: &[PathBuf],
    identity: &Identity,
    message: &str,
) -> Result<String, GitError> {
    let repo = open(ctx)?;
    let mut index = repo.index()?;

    for path in paths {
        stage_path(&repo, &mut index, path).map_err(|e| GitError::IndexUpdate {
            path: path.display().to_string(),
            detail: e.message().to_string(),
        })?;
    }
    index.write()?;

    let tree = repo.find_tree(index.write_tree()?)?;
    let signature = Signature::now(&identity.name, &identity.email)?;

    let parent: Option<Commit<'_>> = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(e) if is_unborn(&e) => {
            debug!("HEAD is unborn; creating root commit");
            None
        }
        Err(e) => return Err(e.into()),
    };
    let parents: Vec<&Commit<'_>> = parent.iter().collect();

    let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
    info!(sha = %oid, "created commit");
    Ok(oid.to_string())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_add_then_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "tracked.txt", "t", "init");
        std::fs::write(dir.path().join("new.txt"), "n").unwrap();
        let ctx = RepositoryContext::new(dir.path());
        let new_file = dir.path().join("new.txt");

        assert!(!is_indexed(&ctx, &new_file).unwrap());
        assert!(add_paths(&ctx, &[new_file.clone()]).unwrap().is_empty());
        assert!(is_indexed(&ctx, &new_file).unwrap());
        assert!(remove_paths(&ctx, &[new_file.clone()]).unwrap().is_empty());
        assert!(!is_indexed(&ctx, &new_file).unwrap());
        assert!(is_indexed(&ctx, Path::new("tracked.txt")).unwrap());
    }

    #[test]
    fn test_add_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let ctx = RepositoryContext::new(dir.path());

        let failed = add_paths(&ctx, &[PathBuf::from("missing.txt")]).unwrap();
        assert_eq!(failed, vec![PathBuf::from("missing.txt")]);
    }

    #[test]
    fn test_commit_on_unborn_then_child() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let ctx = RepositoryContext::new(dir.path());
        let identity = Identity::new("Alice", "alice@example.com");

        let first = commit(&ctx, &[PathBuf::from("a.txt")], &identity, "first").unwrap();
        std::fs::write(dir.path().join("a.txt"), "b").unwrap();
        let second = commit(&ctx, &[PathBuf::from("a.txt")], &identity, "second").unwrap();

        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id().to_string(), second);
        assert_eq!(head.parent(0).unwrap().id().to_string(), first);
        assert_eq!(head.author().name(), Some("Alice"));
    }

    #[test]
    fn test_commit_rejects_unknown_path() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let before = commit_file(&repo, "a.txt", "a", "init");
        std::fs::write(dir.path().join("a.txt"), "changed").unwrap();
        let ctx = RepositoryContext::new(dir.path());

        let err = commit(
            &ctx,
            &[PathBuf::from("a.txt"), PathBuf::from("typo.txt")],
            &Identity::new("A", "a@example.com"),
            "msg",
        )
        .unwrap_err();
        match err {
            GitError::IndexUpdate { path, detail } => {
                assert_eq!(path, "typo.txt");
                assert!(detail.contains("does not exist"), "{detail}");
            }
            other => panic!("expected IndexUpdate, got {other:?}"),
        }
        assert_eq!(repo.head().unwrap().target().unwrap(), before);
    }

    #[test]
    fn test_commit_stages_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "gone.txt", "x", "init");
        std::fs::remove_file(dir.path().join("gone.txt")).unwrap();
        let ctx = RepositoryContext::new(dir.path());

        commit(
            &ctx,
            &[PathBuf::from("gone.txt")],
            &Identity::new("A", "a@example.com"),
            "delete",
        )
        .unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(tree.get_path(Path::new("gone.txt")).is_err());
    }
}
