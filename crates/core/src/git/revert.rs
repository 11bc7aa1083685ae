//! Discard working-tree changes for selected paths.

use std::collections::BTreeSet;
use std::path::PathBuf;

use git2::build::CheckoutBuilder;
use git2::CheckoutNotificationType;
use tracing::{info, instrument, warn};

use super::{open, workdir_relative};
use crate::context::RepositoryContext;
use crate::errors::GitError;

/// Force-checkout exactly `paths` from HEAD.
///
/// Paths the checkout reports as conflicting or ignored, and any update to a
/// path outside the requested set, are returned as failures. A failed
/// checkout marks every requested path that was not already reported.
#[instrument(skip(ctx, paths), fields(count = paths.len()))]
pub(crate) fn revert_paths(ctx: &RepositoryContext, paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }

    let repo = open(ctx)?;
    let head = repo.head().map_err(|_| GitError::UnbornHead)?.peel_to_commit()?;

    let requested: BTreeSet<PathBuf> = paths.iter().map(|p| workdir_relative(&repo, p)).collect();
    let mut failed: BTreeSet<PathBuf> = BTreeSet::new();

    let result = {
        let mut checkout = CheckoutBuilder::new();
        checkout.force().disable_pathspec_match(true);
        for path in &requested {
            checkout.path(path.as_path());
        }
        checkout
            .notify_on(
                CheckoutNotificationType::CONFLICT
                    | CheckoutNotificationType::IGNORED
                    | CheckoutNotificationType::UPDATED,
            )
            .notify(|kind, path, _baseline, _target, _workdir| {
                if let Some(path) = path {
                    let expected = kind == CheckoutNotificationType::UPDATED && requested.contains(path);
                    if !expected {
                        failed.insert(path.to_path_buf());
                    }
                }
                true
            });
        repo.checkout_tree(head.as_object(), Some(&mut checkout))
    };

    if let Err(e) = result {
        warn!(error = %e, "revert checkout failed");
        failed.extend(requested.iter().cloned());
    }

    let failed: Vec<PathBuf> = failed.into_iter().collect();
    info!(
        reverted = requested.len().saturating_sub(failed.len()),
        failed = failed.len(),
        "revert done"
    );
    Ok(failed)
}
