//! Push the current branch.

use std::sync::Arc;

use tracing::info;

use super::HandlerCore;
use crate::models::PushResult;

pub struct PushHandler {
    pub(super) core: HandlerCore,
}

impl PushHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self { core }
    }

    /// Push HEAD's branch to the same ref on the conventional remote.
    pub fn push(&mut self) -> Option<PushResult> {
        let _span = self.core.span("push").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        let progress = self.core.progress();
        let result = match self.core.backend.push(&ctx, &progress) {
            Ok(()) => PushResult::Success,
            Err(e) if e.is_cancelled() => {
                self.core.errors.push_error("push", &e);
                PushResult::Cancelled
            }
            Err(e) => {
                self.core.errors.push_error("push", &e);
                PushResult::Error
            }
        };
        progress.hide();
        info!(?result, "push finished");
        Some(result)
    }
}
