//! Divergence between HEAD and its upstream.
//!
//! Both walks check the context's cancel flag before visiting each commit and
//! return the zero value (empty sets / `false`) once it is set.

use std::collections::BTreeSet;

use git2::{Commit, ObjectType, Oid, Repository, TreeWalkMode, TreeWalkResult};
use tracing::{debug, info};

use super::{is_unborn, open};
use crate::context::{CancelFlag, RepositoryContext};
use crate::errors::GitError;
use crate::models::Divergence;

/// `(head, upstream)` tips, or `None` when HEAD is unborn, detached, or has no
/// upstream configured.
fn head_and_upstream(repo: &Repository) -> Result<Option<(Oid, Oid)>, GitError> {
    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if is_unborn(&e) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !head.is_branch() {
        return Ok(None);
    }
    let Some(head_name) = head.name() else {
        return Ok(None);
    };
    let Ok(upstream_name) = repo.branch_upstream_name(head_name) else {
        debug!(branch = head_name, "no upstream configured");
        return Ok(None);
    };
    let Some(upstream_name) = upstream_name.as_str() else {
        return Ok(None);
    };
    let Ok(upstream) = repo.refname_to_id(upstream_name) else {
        debug!(upstream = upstream_name, "upstream ref missing");
        return Ok(None);
    };
    let Some(head_oid) = head.target() else {
        return Ok(None);
    };
    Ok(Some((head_oid, upstream)))
}

/// Paths touched by `commit` relative to its first parent, or its whole tree
/// for a root commit.
fn touched_paths(repo: &Repository, commit: &Commit<'_>, paths: &mut BTreeSet<String>) -> Result<(), GitError> {
    let tree = commit.tree()?;

    if commit.parent_count() == 0 {
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    paths.insert(format!("{root}{name}"));
                }
            }
            TreeWalkResult::Ok
        })?;
        return Ok(());
    }

    let parent_tree = commit.parent(0)?.tree()?;
    let diff = repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?;
    for delta in diff.deltas() {
        for file in [delta.old_file(), delta.new_file()] {
            if let Some(path) = file.path() {
                paths.insert(path.to_string_lossy().into_owned());
            }
        }
    }
    Ok(())
}

/// Paths changed by commits reachable from `from` but not from `hide`.
/// `None` when cancelled mid-walk.
fn changed_between(
    repo: &Repository,
    from: Oid,
    hide: Oid,
    cancel: &CancelFlag,
) -> Result<Option<BTreeSet<String>>, GitError> {
    let mut revwalk = repo.revwalk()?;
    revwalk.push(from)?;
    revwalk.hide(hide)?;

    let mut paths = BTreeSet::new();
    for oid in revwalk {
        if cancel.is_cancelled() {
            info!("divergence walk cancelled");
            return Ok(None);
        }
        let commit = repo.find_commit(oid?)?;
        touched_paths(repo, &commit, &mut paths)?;
    }
    Ok(Some(paths))
}

/// Files changed locally (not pushed) and upstream (not pulled).
pub(crate) fn different_files(ctx: &RepositoryContext) -> Result<Divergence, GitError> {
    let repo = open(ctx)?;
    let Some((head, upstream)) = head_and_upstream(&repo)? else {
        return Ok(Divergence::default());
    };
    let cancel = ctx.cancel_flag();

    let Some(local) = changed_between(&repo, head, upstream, &cancel)? else {
        return Ok(Divergence::default());
    };
    let Some(remote) = changed_between(&repo, upstream, head, &cancel)? else {
        return Ok(Divergence::default());
    };

    debug!(local = local.len(), remote = remote.len(), "computed divergence");
    Ok(Divergence { local, remote })
}

/// True with no upstream, or when HEAD has at least one commit upstream lacks.
pub(crate) fn has_local_commits(ctx: &RepositoryContext) -> Result<bool, GitError> {
    let repo = open(ctx)?;
    let Some((head, upstream)) = head_and_upstream(&repo)? else {
        return Ok(true);
    };
    let cancel = ctx.cancel_flag();

    let mut revwalk = repo.revwalk()?;
    revwalk.push(head)?;
    revwalk.hide(upstream)?;
    if cancel.is_cancelled() {
        return Ok(false);
    }
    match revwalk.next() {
        Some(oid) => {
            oid?;
            Ok(true)
        }
        None => Ok(false),
    }
}
