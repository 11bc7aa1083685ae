//! Clone a remote into a new working directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::HandlerCore;
use crate::git::remote_url::redact_url;
use crate::models::CloneResult;

pub struct CloneHandler {
    pub(super) core: HandlerCore,
}

impl CloneHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self { core }
    }

    /// Clone `url` into `dest` (created when absent) and install the new
    /// repository in the context.
    pub fn clone_repository(&mut self, url: &str, dest: impl AsRef<Path>) -> Option<CloneResult> {
        let dest: PathBuf = dest.as_ref().to_path_buf();
        let _span = self.core.span("clone").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        // The negotiator classifies the transport from the context's URL.
        let previous_url = ctx.remote_url();
        ctx.set_remote_url(url);

        let progress = self.core.progress();
        let outcome = self.core.backend.clone_repository(&ctx, url, &dest, &progress);
        progress.hide();

        let result = match outcome {
            Ok(()) => {
                ctx.set_repo_path(&dest);
                self.core.refresh_remote_info();
                info!(url = %redact_url(url), dest = %dest.display(), "clone finished");
                CloneResult::Success
            }
            Err(e) => {
                ctx.set_remote_url(&previous_url);
                self.core.errors.push_error("clone", &e);
                if e.is_cancelled() {
                    CloneResult::Cancelled
                } else {
                    CloneResult::Error
                }
            }
        };
        Some(result)
    }
}
