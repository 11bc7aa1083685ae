//! Branch switching, creation and listing.

use std::sync::Arc;

use tracing::info;

use super::HandlerCore;
use crate::errors::GitError;
use crate::models::{BranchResult, BranchScope};

pub struct BranchHandler {
    pub(super) core: HandlerCore,
}

impl BranchHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self { core }
    }

    /// Check out `name` and point HEAD at it, then refresh remote info for
    /// the new branch.
    pub fn switch_branch(&mut self, name: &str) -> Option<BranchResult> {
        let _span = self.core.span("switch_branch").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        let result = match self.core.backend.switch_branch(&ctx, name) {
            Ok(()) => {
                self.core.refresh_remote_info();
                info!(branch = name, "switched");
                BranchResult::Success
            }
            Err(e @ GitError::RefNotFound(_)) => {
                self.core.errors.push_error("switch branch", &e);
                BranchResult::BranchNotFound
            }
            Err(e @ GitError::CheckoutFailed(_)) => {
                self.core.errors.push_error("switch branch", &e);
                BranchResult::CheckoutFailed
            }
            Err(e) => {
                self.core.errors.push_error("switch branch", &e);
                BranchResult::Error
            }
        };
        Some(result)
    }

    /// New local branch at HEAD; HEAD stays where it is.
    pub fn create_branch(&mut self, name: &str) -> Option<BranchResult> {
        let _span = self.core.span("create_branch").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        if name.trim().is_empty() {
            self.core.errors.push("create branch: empty branch name");
            return Some(BranchResult::Error);
        }
        match self.core.backend.create_branch(&ctx, name) {
            Ok(()) => Some(BranchResult::Success),
            Err(e) => {
                self.core.errors.push_error("create branch", &e);
                Some(BranchResult::Error)
            }
        }
    }

    pub fn list_branches(&mut self, scope: BranchScope) -> Vec<String> {
        match self.core.backend.list_branches(&self.core.ctx, scope) {
            Ok(names) => names,
            Err(e) => {
                self.core.errors.push_error("list branches", &e);
                Vec::new()
            }
        }
    }

    pub fn current_branch(&mut self) -> Option<String> {
        match self.core.backend.current_branch(&self.core.ctx) {
            Ok(name) => name,
            Err(e) => {
                self.core.errors.push_error("current branch", &e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::core_with;
    use crate::handlers::OperationHandler;
    use crate::models::ConnectionType;
    use crate::testing::ScriptedBackend;

    #[test]
    fn test_switch_maps_failures() {
        let (core, _) = core_with(ScriptedBackend::default());
        let mut handler = BranchHandler::new(core);
        assert_eq!(handler.switch_branch("nope"), Some(BranchResult::BranchNotFound));
        assert!(handler.pop_error().unwrap().contains("nope"));

        let (core, _) = core_with(ScriptedBackend {
            checkout_fails: true,
            ..Default::default()
        });
        let mut handler = BranchHandler::new(core);
        assert_eq!(handler.switch_branch("main"), Some(BranchResult::CheckoutFailed));
    }

    #[test]
    fn test_switch_refreshes_remote_info() {
        let (core, _) = core_with(ScriptedBackend {
            tracking_url: Some("git@example.com:org/repo.git".into()),
            ..Default::default()
        });
        let ctx = Arc::clone(core.context());
        let mut handler = BranchHandler::new(core);

        assert_eq!(handler.switch_branch("main"), Some(BranchResult::Success));
        assert_eq!(ctx.connection_type(), ConnectionType::Ssh);
        assert_eq!(ctx.remote_url(), "git@example.com:org/repo.git");
    }

    #[test]
    fn test_create_rejects_empty_name() {
        let (core, backend) = core_with(ScriptedBackend::default());
        let mut handler = BranchHandler::new(core);
        assert_eq!(handler.create_branch("  "), Some(BranchResult::Error));
        assert_eq!(handler.create_branch("feature"), Some(BranchResult::Success));
        assert_eq!(backend.calls(), vec!["create_branch:feature"]);
        assert_eq!(handler.current_branch().as_deref(), Some("main"));
    }
}
