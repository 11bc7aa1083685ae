//! Two-phase index mutation.
//!
//! [`IndexHandler::add`] and [`IndexHandler::remove`] only validate and queue;
//! [`IndexHandler::perform_add`] and [`IndexHandler::perform_remove`] apply
//! the queue as one batch and write the index once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::HandlerCore;

pub struct IndexHandler {
    pub(super) core: HandlerCore,
    pending_add: Vec<PathBuf>,
    pending_remove: Vec<PathBuf>,
    failed: Vec<PathBuf>,
}

impl IndexHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self {
            core,
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Queue `path` for addition. Rejected when it is already indexed.
    pub fn add(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.core.backend.is_indexed(&self.core.ctx, path) {
            Ok(false) => {
                self.pending_add.push(path.to_path_buf());
                true
            }
            Ok(true) => {
                self.core
                    .errors
                    .push(format!("{} is already in the index", path.display()));
                false
            }
            Err(e) => {
                self.core.errors.push_error("index add", &e);
                false
            }
        }
    }

    /// Queue `path` for removal. Rejected when it is not indexed.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.core.backend.is_indexed(&self.core.ctx, path) {
            Ok(true) => {
                self.pending_remove.push(path.to_path_buf());
                true
            }
            Ok(false) => {
                self.core
                    .errors
                    .push(format!("{} is not in the index", path.display()));
                false
            }
            Err(e) => {
                self.core.errors.push_error("index remove", &e);
                false
            }
        }
    }

    /// Paths the last batch could not apply.
    pub fn failed_files(&self) -> &[PathBuf] {
        &self.failed
    }

    /// Apply queued additions. `Some(true)` when every path was added.
    pub fn perform_add(&mut self) -> Option<bool> {
        let _span = self.core.span("index_add").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        let paths = std::mem::take(&mut self.pending_add);
        self.failed = match self.core.backend.add_to_index(&ctx, &paths) {
            Ok(failed) => failed,
            Err(e) => {
                self.core.errors.push_error("index add", &e);
                paths
            }
        };
        Some(self.failed.is_empty())
    }

    /// Apply queued removals. `Some(true)` when every path was removed.
    pub fn perform_remove(&mut self) -> Option<bool> {
        let _span = self.core.span("index_remove").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        let paths = std::mem::take(&mut self.pending_remove);
        self.failed = match self.core.backend.remove_from_index(&ctx, &paths) {
            Ok(failed) => failed,
            Err(e) => {
                self.core.errors.push_error("index remove", &e);
                paths
            }
        };
        Some(self.failed.is_empty())
    }
}
