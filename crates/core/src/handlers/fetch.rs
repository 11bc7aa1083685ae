//! Fetch and pull.

use std::sync::Arc;

use tracing::info;

use super::HandlerCore;
use crate::models::{CommitDetails, ConflictEntry, FetchResult, PullResult};
use crate::sync_engine::SyncEngine;

pub struct FetchHandler {
    pub(super) core: HandlerCore,
    commits: Vec<CommitDetails>,
    conflicts: Vec<ConflictEntry>,
}

impl FetchHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self {
            core,
            commits: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    /// Fetch the conventional remote without touching the working tree.
    pub fn fetch(&mut self) -> Option<FetchResult> {
        let _span = self.core.span("fetch").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        let progress = self.core.progress();
        let result = match self.core.backend.fetch(&ctx, &progress) {
            Ok(()) => FetchResult::Success,
            Err(e) if e.is_cancelled() => {
                self.core.errors.push_error("fetch", &e);
                FetchResult::Cancelled
            }
            Err(e) => {
                self.core.errors.push_error("fetch", &e);
                FetchResult::Error
            }
        };
        progress.hide();
        info!(?result, "fetch finished");
        Some(result)
    }

    /// Fetch, then fast-forward, merge or rebase the current branch.
    ///
    /// After a fast-forward [`commit_log`](Self::commit_log) lists the new
    /// commits; after a conflicted merge [`conflicts`](Self::conflicts) lists
    /// the conflicted files.
    pub fn pull(&mut self) -> Option<PullResult> {
        let _span = self.core.span("pull").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let guard = ctx.try_acquire()?;

        let progress = self.core.progress();
        let engine = SyncEngine::new(Arc::clone(&self.core.backend));
        let outcome = engine.pull(&guard, &progress, &mut self.core.errors);
        progress.hide();

        self.commits = outcome.commits;
        self.conflicts = outcome.conflicts;
        Some(outcome.result)
    }

    /// Commits applied by the last fast-forward, oldest first.
    pub fn commit_log(&self) -> &[CommitDetails] {
        &self.commits
    }

    /// Conflicts left by the last merge attempt.
    pub fn conflicts(&self) -> &[ConflictEntry] {
        &self.conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::core_with;
    use crate::handlers::OperationHandler;
    use crate::models::MergeAnalysis;
    use crate::testing::{commit_details, Failure, ScriptedBackend};

    #[test]
    fn test_fetch_cancel_is_distinguished() {
        let (core, _) = core_with(ScriptedBackend {
            fetch_failure: Some(Failure::Cancelled),
            ..Default::default()
        });
        let mut handler = FetchHandler::new(core);
        assert_eq!(handler.fetch(), Some(FetchResult::Cancelled));
        assert!(handler.pop_error().unwrap().contains("cancelled"));
    }

    #[test]
    fn test_fetch_network_failure_is_error() {
        let (core, _) = core_with(ScriptedBackend {
            fetch_failure: Some(Failure::Network),
            ..Default::default()
        });
        let mut handler = FetchHandler::new(core);
        assert_eq!(handler.fetch(), Some(FetchResult::Error));
    }

    #[test]
    fn test_busy_context_declines_quietly() {
        let (core, backend) = core_with(ScriptedBackend::default());
        let ctx = Arc::clone(core.context());
        let mut handler = FetchHandler::new(core);

        let _held = ctx.try_acquire().unwrap();
        assert_eq!(handler.pull(), None);
        assert_eq!(handler.fetch(), None);
        assert!(handler.errors().is_empty());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_pull_keeps_commit_log() {
        let (core, _) = core_with(ScriptedBackend {
            analysis: MergeAnalysis::FAST_FORWARD,
            new_commits: vec![commit_details("abc", "2024-01-01 00:00:00 +0000")],
            ..Default::default()
        });
        let mut handler = FetchHandler::new(core);
        assert_eq!(handler.pull(), Some(PullResult::FastForward));
        assert_eq!(handler.commit_log()[0].sha, "abc");
        assert!(handler.conflicts().is_empty());
    }

    #[test]
    fn test_slot_released_after_pull() {
        let (core, _) = core_with(ScriptedBackend::default());
        let ctx = Arc::clone(core.context());
        let mut handler = FetchHandler::new(core);
        assert_eq!(handler.pull(), Some(PullResult::UpToDate));
        assert!(!ctx.is_busy());
    }
}
