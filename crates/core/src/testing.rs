//! Scripted [`GitBackend`] for unit tests.
//!
//! Every call is appended to `calls` by name so tests can assert ordering.
//! Behaviour is configured through the public fields before the backend is
//! wrapped in an `Arc`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::backend::{FastForwardTarget, GitBackend};
use crate::context::RepositoryContext;
use crate::errors::GitError;
use crate::models::{
    BranchScope, CommitDetails, ConflictEntry, ConflictSide, Divergence, Identity,
    MergeAnalysis, RebaseOutcome, RemoteConfig, StatusEntry,
};
use crate::progress::ProgressAdapter;

/// How a scripted network call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Cancelled,
    Network,
}

impl Failure {
    fn into_error(self, operation: &str) -> GitError {
        match self {
            Self::Cancelled => GitError::Cancelled {
                operation: operation.into(),
            },
            Self::Network => GitError::Network {
                operation: operation.into(),
                detail: "connection refused".into(),
            },
        }
    }
}

pub struct ScriptedBackend {
    pub calls: Mutex<Vec<String>>,
    pub existing_repository: bool,
    pub fetch_failure: Option<Failure>,
    pub push_failure: Option<Failure>,
    pub clone_failure: Option<Failure>,
    pub analysis: MergeAnalysis,
    pub pull_rebase: Option<bool>,
    pub dirty: bool,
    pub conflicts: Vec<ConflictEntry>,
    pub rebase: RebaseOutcome,
    pub new_commits: Vec<CommitDetails>,
    pub checkout_fails: bool,
    pub branches: Vec<String>,
    pub current: Option<String>,
    pub tracking_url: Option<String>,
    pub status_entries: Vec<StatusEntry>,
    pub divergence: Divergence,
    pub indexed: Mutex<BTreeSet<PathBuf>>,
    pub revert_failures: Vec<PathBuf>,
    pub config: Vec<(String, String)>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            existing_repository: false,
            fetch_failure: None,
            push_failure: None,
            clone_failure: None,
            analysis: MergeAnalysis::UP_TO_DATE,
            pull_rebase: None,
            dirty: false,
            conflicts: Vec::new(),
            rebase: RebaseOutcome::Completed { replayed: 1 },
            new_commits: Vec::new(),
            checkout_fails: false,
            branches: vec!["main".into()],
            current: Some("main".into()),
            tracking_url: None,
            status_entries: Vec::new(),
            divergence: Divergence::default(),
            indexed: Mutex::new(BTreeSet::new()),
            revert_failures: Vec::new(),
            config: Vec::new(),
        }
    }
}

impl ScriptedBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

pub fn conflict(filename: &str) -> ConflictEntry {
    ConflictEntry {
        filename: filename.into(),
        our_oid: "1".repeat(40),
        their_oid: "2".repeat(40),
        our_timestamp: 0,
        their_timestamp: 0,
        our_status: ConflictSide::Changed,
        their_status: ConflictSide::Changed,
        use_ours: false,
    }
}

pub fn commit_details(sha: &str, date: &str) -> CommitDetails {
    CommitDetails {
        sha: sha.into(),
        first_line: format!("commit {sha}"),
        author: "Test".into(),
        date: date.into(),
    }
}

impl GitBackend for ScriptedBackend {
    fn is_repository(&self, _path: &Path) -> bool {
        self.record("is_repository");
        self.existing_repository
    }

    fn init_repository(&self, _path: &Path) -> Result<(), GitError> {
        self.record("init_repository");
        Ok(())
    }

    fn setup_remote(&self, _ctx: &RepositoryContext, _remote: &RemoteConfig) -> Result<(), GitError> {
        self.record("setup_remote");
        Ok(())
    }

    fn clone_repository(
        &self,
        _ctx: &RepositoryContext,
        _url: &str,
        _dest: &Path,
        _progress: &ProgressAdapter,
    ) -> Result<(), GitError> {
        self.record("clone");
        match self.clone_failure {
            Some(f) => Err(f.into_error("clone")),
            None => Ok(()),
        }
    }

    fn remove_vcs(&self, ctx: &RepositoryContext) -> Result<(), GitError> {
        self.record("remove_vcs");
        ctx.release_repository();
        Ok(())
    }

    fn tracking_remote_url(&self, _ctx: &RepositoryContext) -> Result<Option<String>, GitError> {
        self.record("tracking_remote_url");
        Ok(self.tracking_url.clone())
    }

    fn fetch(&self, _ctx: &RepositoryContext, _progress: &ProgressAdapter) -> Result<(), GitError> {
        self.record("fetch");
        match self.fetch_failure {
            Some(f) => Err(f.into_error("fetch")),
            None => Ok(()),
        }
    }

    fn push(&self, _ctx: &RepositoryContext, _progress: &ProgressAdapter) -> Result<(), GitError> {
        self.record("push");
        match self.push_failure {
            Some(f) => Err(f.into_error("push")),
            None => Ok(()),
        }
    }

    fn merge_analysis(&self, _ctx: &RepositoryContext) -> Result<MergeAnalysis, GitError> {
        self.record("merge_analysis");
        Ok(self.analysis)
    }

    fn fast_forward_target(&self, _ctx: &RepositoryContext) -> Result<FastForwardTarget, GitError> {
        self.record("fast_forward_target");
        Ok(FastForwardTarget {
            branch_ref: "refs/heads/main".into(),
            old_oid: Some("a".repeat(40)),
            new_oid: "b".repeat(40),
        })
    }

    fn checkout_commit(&self, _ctx: &RepositoryContext, _oid: &str) -> Result<(), GitError> {
        self.record("checkout_commit");
        if self.checkout_fails {
            return Err(GitError::CheckoutFailed("scripted failure".into()));
        }
        Ok(())
    }

    fn update_branch(&self, _ctx: &RepositoryContext, _branch_ref: &str, _oid: &str) -> Result<(), GitError> {
        self.record("update_branch");
        Ok(())
    }

    fn commits_between(
        &self,
        _ctx: &RepositoryContext,
        _old: Option<&str>,
        _new: &str,
    ) -> Result<Vec<CommitDetails>, GitError> {
        self.record("commits_between");
        Ok(self.new_commits.clone())
    }

    fn cleanup_state(&self, _ctx: &RepositoryContext) -> Result<(), GitError> {
        self.record("cleanup_state");
        Ok(())
    }

    fn has_unstaged_changes(&self, _ctx: &RepositoryContext) -> Result<bool, GitError> {
        self.record("has_unstaged_changes");
        Ok(self.dirty)
    }

    fn merge_fetched(&self, _ctx: &RepositoryContext) -> Result<Vec<ConflictEntry>, GitError> {
        self.record("merge");
        Ok(self.conflicts.clone())
    }

    fn rebase_fetched(&self, _ctx: &RepositoryContext) -> Result<RebaseOutcome, GitError> {
        self.record("rebase");
        Ok(self.rebase)
    }

    fn commit(
        &self,
        _ctx: &RepositoryContext,
        _paths: &[PathBuf],
        identity: &Identity,
        _message: &str,
    ) -> Result<String, GitError> {
        self.record(&format!("commit:{}", identity.name));
        Ok("c".repeat(40))
    }

    fn create_branch(&self, _ctx: &RepositoryContext, name: &str) -> Result<(), GitError> {
        self.record(&format!("create_branch:{name}"));
        Ok(())
    }

    fn switch_branch(&self, _ctx: &RepositoryContext, name: &str) -> Result<(), GitError> {
        self.record(&format!("switch_branch:{name}"));
        if !self.branches.iter().any(|b| b == name) {
            return Err(GitError::RefNotFound(name.into()));
        }
        if self.checkout_fails {
            return Err(GitError::CheckoutFailed("scripted failure".into()));
        }
        Ok(())
    }

    fn revert_paths(&self, _ctx: &RepositoryContext, _paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError> {
        self.record("revert_paths");
        Ok(self.revert_failures.clone())
    }

    fn is_indexed(&self, _ctx: &RepositoryContext, path: &Path) -> Result<bool, GitError> {
        Ok(self.indexed.lock().unwrap().contains(path))
    }

    fn add_to_index(&self, _ctx: &RepositoryContext, paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError> {
        self.record("add_to_index");
        self.indexed.lock().unwrap().extend(paths.iter().cloned());
        Ok(Vec::new())
    }

    fn remove_from_index(&self, _ctx: &RepositoryContext, paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError> {
        self.record("remove_from_index");
        let mut indexed = self.indexed.lock().unwrap();
        for path in paths {
            indexed.remove(path);
        }
        Ok(Vec::new())
    }

    fn current_branch(&self, _ctx: &RepositoryContext) -> Result<Option<String>, GitError> {
        Ok(self.current.clone())
    }

    fn list_branches(&self, _ctx: &RepositoryContext, _scope: BranchScope) -> Result<Vec<String>, GitError> {
        Ok(self.branches.clone())
    }

    fn status(&self, _ctx: &RepositoryContext, _filter: Option<&Path>) -> Result<Vec<StatusEntry>, GitError> {
        Ok(self.status_entries.clone())
    }

    fn different_files(&self, _ctx: &RepositoryContext) -> Result<Divergence, GitError> {
        self.record("different_files");
        Ok(self.divergence.clone())
    }

    fn has_local_commits(&self, _ctx: &RepositoryContext) -> Result<bool, GitError> {
        Ok(!self.divergence.local.is_empty())
    }

    fn config_string(&self, _ctx: &RepositoryContext, key: &str) -> Result<Option<String>, GitError> {
        Ok(self
            .config
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    fn config_bool(&self, _ctx: &RepositoryContext, key: &str) -> Result<Option<bool>, GitError> {
        if key == "pull.rebase" {
            return Ok(self.pull_rebase);
        }
        Ok(None)
    }
}
