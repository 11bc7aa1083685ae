//! Working-tree status.

use std::path::Path;

use git2::{Status, StatusOptions};
use tracing::debug;

use super::{open, workdir_relative};
use crate::context::RepositoryContext;
use crate::errors::GitError;
use crate::models::{FileStatusKind, StatusEntry};

/// Map raw engine status bits onto a single classification.
pub fn classify(status: Status) -> FileStatusKind {
    if status.is_conflicted() {
        FileStatusKind::Conflicted
    } else if status.is_ignored() {
        FileStatusKind::Ignored
    } else if status.is_index_new() {
        FileStatusKind::Added
    } else if status.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
        FileStatusKind::Deleted
    } else if status.intersects(
        Status::WT_MODIFIED
            | Status::INDEX_MODIFIED
            | Status::WT_RENAMED
            | Status::INDEX_RENAMED
            | Status::WT_TYPECHANGE
            | Status::INDEX_TYPECHANGE,
    ) {
        FileStatusKind::Modified
    } else if status.is_wt_new() {
        FileStatusKind::Untracked
    } else {
        FileStatusKind::Current
    }
}

/// Status of every path under `filter`, unmodified files included.
pub(crate) fn status(ctx: &RepositoryContext, filter: Option<&Path>) -> Result<Vec<StatusEntry>, GitError> {
    let repo = open(ctx)?;

    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_unmodified(true)
        .include_ignored(false);
    if let Some(filter) = filter {
        let relative = workdir_relative(&repo, filter);
        if !relative.as_os_str().is_empty() {
            opts.pathspec(relative);
        }
    }

    let statuses = repo.statuses(Some(&mut opts))?;
    let entries: Vec<StatusEntry> = statuses
        .iter()
        .filter_map(|entry| {
            let path = entry.path()?.to_string();
            let status = entry.status();
            Some(StatusEntry {
                relative_path: path,
                status: classify(status),
                raw_status: status.bits(),
            })
        })
        .collect();

    debug!(count = entries.len(), "computed status");
    Ok(entries)
}
