//! Remove version control from a working directory.

use std::sync::Arc;

use super::HandlerCore;

pub struct RemoveVcsHandler {
    pub(super) core: HandlerCore,
}

impl RemoveVcsHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self { core }
    }

    /// Release the context's repository and delete its metadata directory.
    /// Working files are kept.
    pub fn remove(&mut self) -> Option<bool> {
        let _span = self.core.span("remove_vcs").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        match self.core.backend.remove_vcs(&ctx) {
            Ok(()) => Some(true),
            Err(e) => {
                self.core.errors.push_error("remove version control", &e);
                Some(false)
            }
        }
    }
}
