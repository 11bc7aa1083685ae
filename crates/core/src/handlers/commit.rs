//! Commit an explicit list of paths.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use super::config::repository_identity;
use super::HandlerCore;
use crate::models::{CommitResult, Identity};

pub struct CommitHandler {
    pub(super) core: HandlerCore,
    files: Vec<PathBuf>,
    author: Option<Identity>,
    last_commit: Option<String>,
}

impl CommitHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self {
            core,
            files: Vec::new(),
            author: None,
            last_commit: None,
        }
    }

    /// Queue a path for the next commit.
    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Author / committer for the next commit. Without one, the repository's
    /// `user.name` / `user.email` are used, then the configured fallback.
    pub fn set_author(&mut self, identity: Identity) {
        self.author = Some(identity);
    }

    /// SHA of the last successful commit.
    pub fn last_commit(&self) -> Option<&str> {
        self.last_commit.as_deref()
    }

    /// Stage the queued paths and commit them on HEAD.
    ///
    /// The whole commit fails if any path cannot be staged. The queue is
    /// cleared only on success.
    pub fn perform_commit(&mut self, message: &str) -> Option<CommitResult> {
        let _span = self.core.span("commit").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        if ctx.is_cancelled() {
            self.core.errors.push("commit cancelled by user");
            return Some(CommitResult::Cancelled);
        }
        if self.files.is_empty() {
            self.core.errors.push("nothing to commit: no files queued");
            return Some(CommitResult::Error);
        }

        let identity = self.resolve_identity();
        debug!(author = %identity.name, files = self.files.len(), "committing");

        match self
            .core
            .backend
            .commit(&ctx, &self.files, &identity, message)
        {
            Ok(sha) => {
                info!(%sha, "commit created");
                self.last_commit = Some(sha);
                self.files.clear();
                Some(CommitResult::Success)
            }
            Err(e) => {
                self.core.errors.push_error("commit", &e);
                Some(CommitResult::Error)
            }
        }
    }

    fn resolve_identity(&self) -> Identity {
        if let Some(author) = &self.author {
            return author.clone();
        }
        repository_identity(self.core.backend.as_ref(), &self.core.ctx)
            .unwrap_or_else(|| self.core.ctx.fallback_identity().clone())
    }
}
