//! Working-tree status and divergence queries.
//!
//! Read-only: none of these take the single-flight slot, so they may run
//! while a mutating operation is in flight.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::HandlerCore;
use crate::models::{Divergence, FileStatus, FileStatusKind};

pub struct StatusHandler {
    pub(super) core: HandlerCore,
}

impl StatusHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self { core }
    }

    /// Status of every file under `filter` (the whole tree when `None`),
    /// keyed by absolute path.
    pub fn file_status(&mut self, filter: Option<&Path>) -> BTreeMap<PathBuf, FileStatus> {
        let Some(root) = self.core.ctx.project_root() else {
            self.core.errors.push("status: no repository installed");
            return BTreeMap::new();
        };

        let entries = match self.core.backend.status(&self.core.ctx, filter) {
            Ok(entries) => entries,
            Err(e) => {
                self.core.errors.push_error("status", &e);
                return BTreeMap::new();
            }
        };

        entries
            .into_iter()
            .map(|entry| {
                let path = root.join(&entry.relative_path);
                let status = FileStatus {
                    path: path.clone(),
                    status: entry.status,
                    raw_status: entry.raw_status,
                };
                (path, status)
            })
            .collect()
    }

    /// [`file_status`](Self::file_status) with unchanged files reclassified
    /// against the upstream divergence.
    pub fn file_status_with_remote(&mut self, filter: Option<&Path>) -> BTreeMap<PathBuf, FileStatus> {
        let mut statuses = self.file_status(filter);
        let Some(root) = self.core.ctx.project_root() else {
            return statuses;
        };
        let divergence = self.different_files();
        update_remote_status(&mut statuses, &root, &divergence.local, &divergence.remote);
        statuses
    }

    /// Paths touched by local-only and upstream-only commits.
    pub fn different_files(&mut self) -> Divergence {
        match self.core.backend.different_files(&self.core.ctx) {
            Ok(divergence) => divergence,
            Err(e) => {
                self.core.errors.push_error("divergence", &e);
                Divergence::default()
            }
        }
    }

    /// Whether HEAD has commits its upstream lacks.
    pub fn has_local_commits(&mut self) -> bool {
        match self.core.backend.has_local_commits(&self.core.ctx) {
            Ok(ahead) => ahead,
            Err(e) => {
                self.core.errors.push_error("local commits", &e);
                false
            }
        }
    }
}

/// Turn `Current` entries into `Ahead` when a local-only commit touched them,
/// otherwise into `Behind` when an upstream-only commit did.
///
/// `local` and `remote` hold `/`-separated paths relative to `root`, which
/// is the root the map's absolute keys were built from.
pub fn update_remote_status(
    statuses: &mut BTreeMap<PathBuf, FileStatus>,
    root: &Path,
    local: &BTreeSet<String>,
    remote: &BTreeSet<String>,
) {
    if local.is_empty() && remote.is_empty() {
        return;
    }
    for (path, status) in statuses.iter_mut() {
        if status.status != FileStatusKind::Current {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if local.contains(&relative) {
            status.status = FileStatusKind::Ahead;
        } else if remote.contains(&relative) {
            status.status = FileStatusKind::Behind;
        }
    }
    debug!(local = local.len(), remote = remote.len(), "applied remote status");
}
