//! Branch listing, creation and switching.

use git2::build::CheckoutBuilder;
use git2::{BranchType, Reference, Repository};
use tracing::{debug, info, instrument};

use super::{head_branch_ref, open};
use crate::context::RepositoryContext;
use crate::errors::GitError;
use crate::models::BranchScope;

/// Short name of the checked-out branch (also for an unborn branch).
pub(crate) fn current(ctx: &RepositoryContext) -> Result<Option<String>, GitError> {
    let repo = open(ctx)?;
    match head_branch_ref(&repo) {
        Ok(full) => Ok(Some(
            full.strip_prefix("refs/heads/").unwrap_or(&full).to_string(),
        )),
        Err(GitError::RefNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn list(ctx: &RepositoryContext, scope: BranchScope) -> Result<Vec<String>, GitError> {
    let repo = open(ctx)?;
    let kind = match scope {
        BranchScope::Local => BranchType::Local,
        BranchScope::Remote => BranchType::Remote,
    };

    let mut names = Vec::new();
    for entry in repo.branches(Some(kind))? {
        let (branch, _) = entry?;
        if let Some(name) = branch.name()? {
            // symbolic origin/HEAD is not a branch anyone switches to
            if !name.ends_with("/HEAD") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// New local branch at HEAD. HEAD is not moved.
#[instrument(skip(ctx))]
pub(crate) fn create(ctx: &RepositoryContext, name: &str) -> Result<(), GitError> {
    let repo = open(ctx)?;
    let head = repo.head().map_err(|_| GitError::UnbornHead)?;
    let commit = head.peel_to_commit()?;
    repo.branch(name, &commit, false)?;
    info!(name, at = %commit.id(), "created branch");
    Ok(())
}

/// Exact reference lookup first, then "do what I mean" short-name resolution.
fn resolve<'r>(repo: &'r Repository, name: &str) -> Result<Reference<'r>, GitError> {
    if let Ok(reference) = repo.find_reference(name) {
        return Ok(reference);
    }
    debug!(name, "exact lookup failed; trying short-name resolution");
    repo.resolve_reference_from_short_name(name)
        .map_err(|_| GitError::RefNotFound(name.to_string()))
}

/// Check out `name`'s tree, then move HEAD to it.
///
/// HEAD is only updated after the working tree matches the target, so a
/// failed checkout leaves HEAD where it was.
#[instrument(skip(ctx))]
pub(crate) fn switch(ctx: &RepositoryContext, name: &str) -> Result<(), GitError> {
    let repo = open(ctx)?;
    let reference = resolve(&repo, name)?;
    let refname = reference
        .name()
        .ok_or_else(|| GitError::RefNotFound(name.to_string()))?
        .to_string();
    let commit = reference.peel_to_commit()?;

    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))
        .map_err(|e| GitError::CheckoutFailed(e.message().to_string()))?;

    if reference.is_branch() {
        repo.set_head(&refname)?;
    } else {
        repo.set_head_detached(commit.id())?;
    }
    info!(%refname, "switched branch");
    Ok(())
}
