//! Backend façade.
//!
//! Handlers and the sync engine talk to the version-control engine only
//! through [`GitBackend`]. The production implementation is
//! [`Git2Backend`](crate::git::Git2Backend); tests inject scripted doubles.
//! The implementation is chosen at construction time and passed around as
//! `Arc<dyn GitBackend>`.
//!
//! Every method receives the [`RepositoryContext`] it operates on. Methods
//! that touch the network also receive a [`ProgressAdapter`], whose cancel
//! flag they honour.

use std::path::{Path, PathBuf};

use crate::context::RepositoryContext;
use crate::errors::GitError;
use crate::models::{
    BranchScope, CommitDetails, ConflictEntry, Divergence, Identity, MergeAnalysis,
    RebaseOutcome, RemoteConfig, StatusEntry,
};
use crate::progress::ProgressAdapter;

/// Where a fast-forward will move the current branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastForwardTarget {
    /// Full name of the local branch, e.g. `refs/heads/main`.
    pub branch_ref: String,
    /// Branch tip before the update; `None` when the branch is unborn.
    pub old_oid: Option<String>,
    /// Commit the branch will point at.
    pub new_oid: String,
}

/// Operations the handlers and the sync engine need from a VCS engine.
pub trait GitBackend: Send + Sync {
    // === Repository lifecycle ===

    /// Whether `path` already holds a repository.
    fn is_repository(&self, path: &Path) -> bool;

    /// Create an empty repository at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be created.
    fn init_repository(&self, path: &Path) -> Result<(), GitError>;

    /// Add the conventionally named remote to the context's repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote already exists or cannot be written.
    fn setup_remote(&self, ctx: &RepositoryContext, remote: &RemoteConfig) -> Result<(), GitError>;

    /// Clone `url` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns `GitError::Cancelled` when the cancel flag stopped the transfer.
    fn clone_repository(
        &self,
        ctx: &RepositoryContext,
        url: &str,
        dest: &Path,
        progress: &ProgressAdapter,
    ) -> Result<(), GitError>;

    /// Delete the repository metadata directory, leaving working files.
    ///
    /// # Errors
    ///
    /// Returns an error if no repository is installed or deletion fails.
    fn remove_vcs(&self, ctx: &RepositoryContext) -> Result<(), GitError>;

    /// URL of the remote tracked by the current branch, falling back to the
    /// context's conventional remote.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be opened.
    fn tracking_remote_url(&self, ctx: &RepositoryContext) -> Result<Option<String>, GitError>;

    // === Network ===

    /// Fetch from the conventional remote.
    ///
    /// # Errors
    ///
    /// Returns `GitError::Cancelled` when the cancel flag stopped the transfer.
    fn fetch(&self, ctx: &RepositoryContext, progress: &ProgressAdapter) -> Result<(), GitError>;

    /// Push the current branch (HEAD's full ref name) to the conventional
    /// remote.
    ///
    /// # Errors
    ///
    /// Returns `GitError::PushRejected` when the remote refuses the update.
    fn push(&self, ctx: &RepositoryContext, progress: &ProgressAdapter) -> Result<(), GitError>;

    // === Pull primitives ===

    /// Classify the fetched head relative to the current branch.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no fetched head to analyze.
    fn merge_analysis(&self, ctx: &RepositoryContext) -> Result<MergeAnalysis, GitError>;

    /// Resolve the remote-tracking commit the current branch would move to.
    ///
    /// # Errors
    ///
    /// Returns `GitError::RefNotFound` if no tracking branch exists.
    fn fast_forward_target(&self, ctx: &RepositoryContext) -> Result<FastForwardTarget, GitError>;

    /// Check out `oid`'s tree, tolerating conflicts.
    ///
    /// # Errors
    ///
    /// Returns `GitError::CheckoutFailed` if the working tree could not be
    /// written.
    fn checkout_commit(&self, ctx: &RepositoryContext, oid: &str) -> Result<(), GitError>;

    /// Point `branch_ref` at `oid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be updated.
    fn update_branch(&self, ctx: &RepositoryContext, branch_ref: &str, oid: &str)
        -> Result<(), GitError>;

    /// Commits reachable from `new` but not `old`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if either commit cannot be walked.
    fn commits_between(
        &self,
        ctx: &RepositoryContext,
        old: Option<&str>,
        new: &str,
    ) -> Result<Vec<CommitDetails>, GitError>;

    /// Clear any in-progress merge / rebase state.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be opened.
    fn cleanup_state(&self, ctx: &RepositoryContext) -> Result<(), GitError>;

    /// Working-directory-only check for modified or deleted tracked files.
    ///
    /// # Errors
    ///
    /// Returns an error if status cannot be computed.
    fn has_unstaged_changes(&self, ctx: &RepositoryContext) -> Result<bool, GitError>;

    /// Three-way merge of the fetched head into the current branch.
    ///
    /// Returns the conflicts left behind; an empty list means the merge was
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge could not be attempted.
    fn merge_fetched(&self, ctx: &RepositoryContext) -> Result<Vec<ConflictEntry>, GitError>;

    /// Replay local commits onto the fetched head.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebase could not be started or finished.
    fn rebase_fetched(&self, ctx: &RepositoryContext) -> Result<RebaseOutcome, GitError>;

    // === Local writes ===

    /// Stage `paths`, write a tree and commit it on HEAD. Returns the new SHA.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any path cannot be staged.
    fn commit(
        &self,
        ctx: &RepositoryContext,
        paths: &[PathBuf],
        identity: &Identity,
        message: &str,
    ) -> Result<String, GitError>;

    /// Create a local branch at HEAD.
    ///
    /// # Errors
    ///
    /// Returns an error if HEAD is unborn or the branch exists.
    fn create_branch(&self, ctx: &RepositoryContext, name: &str) -> Result<(), GitError>;

    /// Check out `name` and move HEAD to it.
    ///
    /// # Errors
    ///
    /// Returns `GitError::RefNotFound` when `name` resolves to nothing and
    /// `GitError::CheckoutFailed` when the tree cannot be written.
    fn switch_branch(&self, ctx: &RepositoryContext, name: &str) -> Result<(), GitError>;

    /// Force-checkout `paths` from HEAD. Returns paths that could not be
    /// restored.
    ///
    /// # Errors
    ///
    /// Returns an error if HEAD cannot be resolved.
    fn revert_paths(&self, ctx: &RepositoryContext, paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError>;

    /// Whether `path` has an entry in the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    fn is_indexed(&self, ctx: &RepositoryContext, path: &Path) -> Result<bool, GitError>;

    /// Add `paths` to the index, writing it once. Returns paths that failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be opened or written.
    fn add_to_index(&self, ctx: &RepositoryContext, paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError>;

    /// Remove `paths` from the index, writing it once. Returns paths that
    /// failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be opened or written.
    fn remove_from_index(
        &self,
        ctx: &RepositoryContext,
        paths: &[PathBuf],
    ) -> Result<Vec<PathBuf>, GitError>;

    // === Queries ===

    /// Short name of the checked-out branch; `None` when HEAD is detached.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be opened.
    fn current_branch(&self, ctx: &RepositoryContext) -> Result<Option<String>, GitError>;

    /// Branch short names in `scope`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if branches cannot be listed.
    fn list_branches(&self, ctx: &RepositoryContext, scope: BranchScope) -> Result<Vec<String>, GitError>;

    /// Status of every path under `filter` (the whole tree when `None`),
    /// including unmodified files.
    ///
    /// # Errors
    ///
    /// Returns an error if status cannot be computed.
    fn status(&self, ctx: &RepositoryContext, filter: Option<&Path>) -> Result<Vec<StatusEntry>, GitError>;

    /// Paths changed by local-only and upstream-only commits.
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be walked.
    fn different_files(&self, ctx: &RepositoryContext) -> Result<Divergence, GitError>;

    /// Whether HEAD has commits its upstream lacks (true with no upstream).
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be walked.
    fn has_local_commits(&self, ctx: &RepositoryContext) -> Result<bool, GitError>;

    /// String value of a repository config key.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be read.
    fn config_string(&self, ctx: &RepositoryContext, key: &str) -> Result<Option<String>, GitError>;

    /// Boolean value of a repository config key.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but is not a boolean.
    fn config_bool(&self, ctx: &RepositoryContext, key: &str) -> Result<Option<bool>, GitError>;
}
