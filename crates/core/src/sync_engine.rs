//! Pull decision procedure.
//!
//! A pull runs as a small state machine:
//!
//! 1. **Fetching**: fetch the conventional remote with credential negotiation
//!    and progress wired in. Any failure, cancellation included, ends the pull
//!    with [`PullResult::Error`].
//! 2. **Analyzing**: classify the fetched head against the current branch and
//!    pick a strategy.
//! 3. **FastForwarding**: check out the target tree, then move the branch,
//!    then collect the commits that arrived.
//! 4. **Merging** / **Rebasing**: refuse on a dirty working tree, otherwise
//!    three-way merge or replay local commits onto the fetched head.
//!
//! The engine never acquires the single-flight slot itself: callers pass the
//! [`OperationGuard`] they hold, so an outer operation can run a pull inside
//! its own slot.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::backend::GitBackend;
use crate::context::{OperationGuard, RepositoryContext};
use crate::error_log::ErrorLog;
use crate::errors::GitError;
use crate::models::{CommitDetails, ConflictEntry, MergeAnalysis, PullResult, RebaseOutcome};
use crate::progress::ProgressAdapter;

/// Git config key consulted for the merge-vs-rebase preference.
pub const PULL_REBASE_KEY: &str = "pull.rebase";

// ---------------------------------------------------------------------------
// Pull state
// ---------------------------------------------------------------------------

/// Where a pull is in its decision procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullState {
    Fetching,
    Analyzing,
    FastForwarding,
    Merging,
    Rebasing,
    Done,
    Failed,
}

impl fmt::Display for PullState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetching => "fetching",
            Self::Analyzing => "analyzing",
            Self::FastForwarding => "fast_forwarding",
            Self::Merging => "merging",
            Self::Rebasing => "rebasing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Everything a finished pull produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub result: PullResult,
    /// Terminal state: [`PullState::Done`] or [`PullState::Failed`].
    pub state: PullState,
    /// Commits that arrived through a fast-forward, oldest first.
    pub commits: Vec<CommitDetails>,
    /// Conflicts left in the index by a failed three-way merge.
    pub conflicts: Vec<ConflictEntry>,
}

impl PullOutcome {
    fn done(result: PullResult) -> Self {
        Self {
            result,
            state: PullState::Done,
            commits: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    fn failed(result: PullResult) -> Self {
        Self {
            result,
            state: PullState::Failed,
            commits: Vec::new(),
            conflicts: Vec::new(),
        }
    }
}

/// Strategy picked for a `Normal` analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Merge,
    Rebase,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs pulls against a [`GitBackend`].
#[derive(Clone)]
pub struct SyncEngine {
    backend: Arc<dyn GitBackend>,
}

impl SyncEngine {
    pub fn new(backend: Arc<dyn GitBackend>) -> Self {
        Self { backend }
    }

    /// Fetch, analyze and reconcile the current branch with its remote.
    ///
    /// Failures are reported through `errors`; the returned outcome always
    /// carries a result code.
    #[instrument(skip_all, name = "pull")]
    pub fn pull(
        &self,
        guard: &OperationGuard<'_>,
        progress: &ProgressAdapter,
        errors: &mut ErrorLog,
    ) -> PullOutcome {
        let ctx = guard.context();

        // 1. Fetch.
        transition(PullState::Fetching);
        if let Err(e) = self.backend.fetch(ctx, progress) {
            fail(ctx, errors, "fetch", &e);
            return PullOutcome::failed(PullResult::Error);
        }

        // 2. Analyze.
        transition(PullState::Analyzing);
        let analysis = match self.backend.merge_analysis(ctx) {
            Ok(a) => a,
            Err(e) => {
                fail(ctx, errors, "merge analysis", &e);
                return PullOutcome::failed(PullResult::Error);
            }
        };
        debug!(?analysis, "merge analysis");

        let outcome = if analysis.unborn {
            errors.push("invalid HEAD, cannot merge");
            PullOutcome::failed(PullResult::MergeFailed)
        } else if analysis.up_to_date {
            self.up_to_date(ctx, errors)
        } else if analysis.fast_forward {
            self.fast_forward(ctx, progress, errors)
        } else if analysis.normal {
            match self.strategy(ctx) {
                Strategy::Rebase => self.rebase(ctx, errors),
                Strategy::Merge => self.merge(ctx, errors),
            }
        } else {
            self.manual_resolution(analysis, errors)
        };

        transition(outcome.state);
        info!(result = %outcome.result, code = outcome.result.code(), "pull finished");
        outcome
    }

    // -----------------------------------------------------------------------
    // Strategies
    // -----------------------------------------------------------------------

    fn up_to_date(&self, ctx: &RepositoryContext, errors: &mut ErrorLog) -> PullOutcome {
        // A lingering merge state from an earlier attempt is stale now.
        if let Err(e) = self.backend.cleanup_state(ctx) {
            fail(ctx, errors, "cleanup", &e);
            return PullOutcome::failed(PullResult::Error);
        }
        PullOutcome::done(PullResult::UpToDate)
    }

    /// Checkout first, then move the branch: a failed checkout leaves the
    /// branch where it was.
    fn fast_forward(
        &self,
        ctx: &RepositoryContext,
        progress: &ProgressAdapter,
        errors: &mut ErrorLog,
    ) -> PullOutcome {
        transition(PullState::FastForwarding);

        let target = match self.backend.fast_forward_target(ctx) {
            Ok(t) => t,
            Err(e) => {
                fail(ctx, errors, "could not find remote tracking branch", &e);
                return PullOutcome::failed(PullResult::Error);
            }
        };

        progress.pulse("Updating working tree");
        if let Err(e) = self.backend.checkout_commit(ctx, &target.new_oid) {
            fail(ctx, errors, "checkout", &e);
            return PullOutcome::failed(PullResult::Error);
        }
        if let Err(e) = self
            .backend
            .update_branch(ctx, &target.branch_ref, &target.new_oid)
        {
            fail(ctx, errors, "update branch", &e);
            return PullOutcome::failed(PullResult::Error);
        }
        if let Err(e) = self.backend.cleanup_state(ctx) {
            warn!(error = %e, "could not clean up repository state after fast-forward");
        }

        let commits = match self
            .backend
            .commits_between(ctx, target.old_oid.as_deref(), &target.new_oid)
        {
            Ok(c) => c,
            Err(e) => {
                // The branch has already moved; only the log is missing.
                warn!(error = %e, "could not collect fast-forwarded commits");
                Vec::new()
            }
        };

        info!(
            branch = %target.branch_ref,
            commits = commits.len(),
            "fast-forwarded"
        );
        PullOutcome {
            commits,
            ..PullOutcome::done(PullResult::FastForward)
        }
    }

    fn merge(&self, ctx: &RepositoryContext, errors: &mut ErrorLog) -> PullOutcome {
        transition(PullState::Merging);
        if let Some(refused) = self.refuse_if_dirty(ctx, errors) {
            return refused;
        }

        match self.backend.merge_fetched(ctx) {
            Ok(conflicts) if conflicts.is_empty() => PullOutcome::done(PullResult::Success),
            Ok(conflicts) => {
                let names: Vec<&str> = conflicts.iter().map(|c| c.filename.as_str()).collect();
                errors.push(format!(
                    "merge left {} conflicted file(s): {}",
                    conflicts.len(),
                    names.join(", ")
                ));
                PullOutcome {
                    conflicts,
                    ..PullOutcome::failed(PullResult::MergeFailed)
                }
            }
            Err(e) => {
                fail(ctx, errors, "merge", &e);
                PullOutcome::failed(PullResult::MergeFailed)
            }
        }
    }

    fn rebase(&self, ctx: &RepositoryContext, errors: &mut ErrorLog) -> PullOutcome {
        transition(PullState::Rebasing);
        if let Some(refused) = self.refuse_if_dirty(ctx, errors) {
            return refused;
        }

        match self.backend.rebase_fetched(ctx) {
            Ok(RebaseOutcome::Completed { replayed }) => {
                debug!(replayed, "rebase completed");
                PullOutcome::done(PullResult::Success)
            }
            Ok(RebaseOutcome::Conflicted) => {
                errors.push("rebase stopped on conflicts and was aborted");
                PullOutcome::failed(PullResult::MergeFailed)
            }
            Err(e) => {
                fail(ctx, errors, "rebase", &e);
                PullOutcome::failed(PullResult::MergeFailed)
            }
        }
    }

    fn manual_resolution(&self, analysis: MergeAnalysis, errors: &mut ErrorLog) -> PullOutcome {
        warn!(?analysis, "merge analysis returned no usable flag");
        errors.push("merge analysis inconclusive; manual resolution required");
        PullOutcome::failed(PullResult::ManualResolutionRequired)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn refuse_if_dirty(&self, ctx: &RepositoryContext, errors: &mut ErrorLog) -> Option<PullOutcome> {
        match self.backend.has_unstaged_changes(ctx) {
            Ok(false) => None,
            Ok(true) => {
                errors.push("working tree has local modifications; commit or revert them first");
                Some(PullOutcome::failed(PullResult::DirtyWorkdir))
            }
            Err(e) => {
                fail(ctx, errors, "status", &e);
                Some(PullOutcome::failed(PullResult::Error))
            }
        }
    }

    /// `pull.rebase` from repository config, else the configured default.
    fn strategy(&self, ctx: &RepositoryContext) -> Strategy {
        let prefer_rebase = match self.backend.config_bool(ctx, PULL_REBASE_KEY) {
            Ok(Some(value)) => value,
            Ok(None) => ctx.sync_settings().prefer_rebase,
            Err(e) => {
                warn!(error = %e, "unreadable {PULL_REBASE_KEY}; using configured default");
                ctx.sync_settings().prefer_rebase
            }
        };
        if prefer_rebase {
            Strategy::Rebase
        } else {
            Strategy::Merge
        }
    }
}

fn transition(state: PullState) {
    debug!(%state, "pull state");
}

/// Append `context: err`, plus the last transport error when it adds detail.
fn fail(ctx: &RepositoryContext, errors: &mut ErrorLog, context: &str, err: &GitError) {
    let message = err.to_string();
    match ctx.last_transport_error() {
        Some(last) if !err.is_cancelled() && !message.contains(&last) => {
            errors.push(format!("{context}: {message} (last error: {last})"));
        }
        _ => errors.push_error(context, err),
    }
}
