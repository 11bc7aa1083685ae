//! Batched revert of working-tree changes.

use std::path::PathBuf;
use std::sync::Arc;

use super::HandlerCore;

pub struct RevertHandler {
    pub(super) core: HandlerCore,
    pending: Vec<PathBuf>,
    failed: Vec<PathBuf>,
}

impl RevertHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self {
            core,
            pending: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Queue a path. Nothing is touched until [`perform_revert`](Self::perform_revert).
    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.pending.push(path.into());
    }

    pub fn pending(&self) -> &[PathBuf] {
        &self.pending
    }

    /// Paths the last revert could not restore.
    pub fn failed_files(&self) -> &[PathBuf] {
        &self.failed
    }

    /// Restore every queued path from HEAD.
    ///
    /// Returns `Some(true)` when all paths were restored. A partial failure is
    /// not an error: the leftovers are listed in
    /// [`failed_files`](Self::failed_files).
    pub fn perform_revert(&mut self) -> Option<bool> {
        let _span = self.core.span("revert").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        let paths = std::mem::take(&mut self.pending);
        self.failed = match self.core.backend.revert_paths(&ctx, &paths) {
            Ok(failed) => failed,
            Err(e) => {
                self.core.errors.push_error("revert", &e);
                paths
            }
        };
        Some(self.failed.is_empty())
    }
}
