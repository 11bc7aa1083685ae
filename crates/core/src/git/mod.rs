//! `git2`-backed implementation of the [`GitBackend`] façade.
//!
//! The repository is reopened from the context's path for every call; each
//! `git2` object (repository, reference, tree, index, …) is released when it
//! goes out of scope, on every exit path.

pub mod branch;
pub mod divergence;
pub mod index;
pub mod pull;
pub mod remote;
pub mod remote_url;
pub mod revert;
pub mod status;

use std::path::{Path, PathBuf};

use git2::{ErrorCode, Repository, Signature};
use tracing::{debug, info, instrument, warn};

use crate::backend::{FastForwardTarget, GitBackend};
use crate::context::{relative_to, RepositoryContext};
use crate::errors::GitError;
use crate::models::{
    BranchScope, CommitDetails, ConflictEntry, Divergence, Identity, MergeAnalysis,
    RebaseOutcome, RemoteConfig, StatusEntry,
};
use crate::progress::ProgressAdapter;

use self::remote_url::{build_remote_url, redact_url};

/// Production backend over libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Backend;

impl Git2Backend {
    pub fn new() -> Self {
        Self
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Open the context's repository.
pub(crate) fn open(ctx: &RepositoryContext) -> Result<Repository, GitError> {
    let path = ctx
        .repo_path()
        .ok_or_else(|| GitError::RepositoryNotFound("<no repository installed>".into()))?;
    Repository::open(&path).map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))
}

/// Repository signature, falling back to the context's identity.
pub(crate) fn default_signature(
    repo: &Repository,
    ctx: &RepositoryContext,
) -> Result<Signature<'static>, GitError> {
    match repo.signature() {
        Ok(sig) => Ok(sig),
        Err(_) => {
            let identity = ctx.fallback_identity();
            Ok(Signature::now(&identity.name, &identity.email)?)
        }
    }
}

/// Full ref name HEAD points at (`refs/heads/...`). Works for unborn HEAD.
pub(crate) fn head_branch_ref(repo: &Repository) -> Result<String, GitError> {
    let head = repo.find_reference("HEAD")?;
    head.symbolic_target()
        .map(str::to_string)
        .ok_or_else(|| GitError::RefNotFound("HEAD is detached".into()))
}

/// Whether a `git2` error means "HEAD has no commit yet".
pub(crate) fn is_unborn(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

/// Path relative to the working directory, as stored in the index.
pub(crate) fn workdir_relative(repo: &Repository, path: &Path) -> PathBuf {
    let Some(root) = repo.workdir() else {
        return path.to_path_buf();
    };
    if path.is_relative() || path.starts_with(root) {
        return relative_to(root, path);
    }
    // symlinked roots (e.g. temp dirs) only match once both sides are resolved
    match (root.canonicalize(), canonical(path)) {
        (Ok(root), Some(path)) => relative_to(&root, &path),
        _ => path.to_path_buf(),
    }
}

/// Canonical form of `path`, resolving only the parent when the file itself
/// does not exist (yet, or any more).
fn canonical(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }
    let parent = path.parent()?.canonicalize().ok()?;
    Some(parent.join(path.file_name()?))
}

// ---------------------------------------------------------------------------
// GitBackend
// ---------------------------------------------------------------------------

impl GitBackend for Git2Backend {
    fn is_repository(&self, path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn init_repository(&self, path: &Path) -> Result<(), GitError> {
        std::fs::create_dir_all(path)?;
        Repository::init(path)?;
        info!("initialized repository");
        Ok(())
    }

    #[instrument(skip(self, ctx, remote))]
    fn setup_remote(&self, ctx: &RepositoryContext, remote: &RemoteConfig) -> Result<(), GitError> {
        let repo = open(ctx)?;
        let url = build_remote_url(remote);
        repo.remote(ctx.remote_name(), &url)?;
        info!(remote = ctx.remote_name(), url = %redact_url(&url), "added remote");
        Ok(())
    }

    fn clone_repository(
        &self,
        ctx: &RepositoryContext,
        url: &str,
        dest: &Path,
        progress: &ProgressAdapter,
    ) -> Result<(), GitError> {
        remote::clone(ctx, url, dest, progress)
    }

    #[instrument(skip(self, ctx))]
    fn remove_vcs(&self, ctx: &RepositoryContext) -> Result<(), GitError> {
        let git_dir = {
            let repo = open(ctx)?;
            if repo.is_bare() {
                return Err(GitError::RepositoryNotFound(format!(
                    "{} is bare; refusing to delete it",
                    repo.path().display()
                )));
            }
            repo.path().to_path_buf()
        };
        ctx.release_repository();
        std::fs::remove_dir_all(&git_dir)?;
        info!(path = %git_dir.display(), "removed repository metadata");
        Ok(())
    }

    fn tracking_remote_url(&self, ctx: &RepositoryContext) -> Result<Option<String>, GitError> {
        let repo = open(ctx)?;
        let config = repo.config()?;

        let tracked = head_branch_ref(&repo)
            .ok()
            .and_then(|r| r.strip_prefix("refs/heads/").map(str::to_string))
            .and_then(|short| config.get_string(&format!("branch.{short}.remote")).ok());
        let remote_name = tracked.unwrap_or_else(|| ctx.remote_name().to_string());

        let url = match repo.find_remote(&remote_name) {
            Ok(remote) => remote.url().map(str::to_string),
            Err(_) => {
                debug!(remote = %remote_name, "remote not configured");
                None
            }
        };
        Ok(url)
    }

    fn fetch(&self, ctx: &RepositoryContext, progress: &ProgressAdapter) -> Result<(), GitError> {
        remote::fetch(ctx, progress)
    }

    fn push(&self, ctx: &RepositoryContext, progress: &ProgressAdapter) -> Result<(), GitError> {
        remote::push(ctx, progress)
    }

    fn merge_analysis(&self, ctx: &RepositoryContext) -> Result<MergeAnalysis, GitError> {
        pull::merge_analysis(ctx)
    }

    fn fast_forward_target(&self, ctx: &RepositoryContext) -> Result<FastForwardTarget, GitError> {
        pull::fast_forward_target(ctx)
    }

    fn checkout_commit(&self, ctx: &RepositoryContext, oid: &str) -> Result<(), GitError> {
        pull::checkout_commit(ctx, oid)
    }

    fn update_branch(&self, ctx: &RepositoryContext, branch_ref: &str, oid: &str) -> Result<(), GitError> {
        pull::update_branch(ctx, branch_ref, oid)
    }

    fn commits_between(
        &self,
        ctx: &RepositoryContext,
        old: Option<&str>,
        new: &str,
    ) -> Result<Vec<CommitDetails>, GitError> {
        pull::commits_between(ctx, old, new)
    }

    fn cleanup_state(&self, ctx: &RepositoryContext) -> Result<(), GitError> {
        open(ctx)?.cleanup_state()?;
        Ok(())
    }

    fn has_unstaged_changes(&self, ctx: &RepositoryContext) -> Result<bool, GitError> {
        pull::has_unstaged_changes(ctx)
    }

    fn merge_fetched(&self, ctx: &RepositoryContext) -> Result<Vec<ConflictEntry>, GitError> {
        pull::merge_fetched(ctx)
    }

    fn rebase_fetched(&self, ctx: &RepositoryContext) -> Result<RebaseOutcome, GitError> {
        pull::rebase_fetched(ctx)
    }

    fn commit(
        &self,
        ctx: &RepositoryContext,
        paths: &[PathBuf],
        identity: &Identity,
        message: &str,
    ) -> Result<String, GitError> {
        index::commit(ctx, paths, identity, message)
    }

    fn create_branch(&self, ctx: &RepositoryContext, name: &str) -> Result<(), GitError> {
        branch::create(ctx, name)
    }

    fn switch_branch(&self, ctx: &RepositoryContext, name: &str) -> Result<(), GitError> {
        branch::switch(ctx, name)
    }

    fn revert_paths(&self, ctx: &RepositoryContext, paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError> {
        revert::revert_paths(ctx, paths)
    }

    fn is_indexed(&self, ctx: &RepositoryContext, path: &Path) -> Result<bool, GitError> {
        index::is_indexed(ctx, path)
    }

    fn add_to_index(&self, ctx: &RepositoryContext, paths: &[PathBuf]) -> Result<Vec<PathBuf>, GitError> {
        index::add_paths(ctx, paths)
    }

    fn remove_from_index(
        &self,
        ctx: &RepositoryContext,
        paths: &[PathBuf],
    ) -> Result<Vec<PathBuf>, GitError> {
        index::remove_paths(ctx, paths)
    }

    fn current_branch(&self, ctx: &RepositoryContext) -> Result<Option<String>, GitError> {
        branch::current(ctx)
    }

    fn list_branches(&self, ctx: &RepositoryContext, scope: BranchScope) -> Result<Vec<String>, GitError> {
        branch::list(ctx, scope)
    }

    fn status(&self, ctx: &RepositoryContext, filter: Option<&Path>) -> Result<Vec<StatusEntry>, GitError> {
        status::status(ctx, filter)
    }

    fn different_files(&self, ctx: &RepositoryContext) -> Result<Divergence, GitError> {
        divergence::different_files(ctx)
    }

    fn has_local_commits(&self, ctx: &RepositoryContext) -> Result<bool, GitError> {
        divergence::has_local_commits(ctx)
    }

    fn config_string(&self, ctx: &RepositoryContext, key: &str) -> Result<Option<String>, GitError> {
        let config = open(ctx)?.config()?;
        match config.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn config_bool(&self, ctx: &RepositoryContext, key: &str) -> Result<Option<bool>, GitError> {
        let config = open(ctx)?.config()?;
        match config.get_bool(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => {
                warn!(key, error = %e, "config value is not a boolean");
                Err(e.into())
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_is_repository_and_init() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Git2Backend::new();
        let path = dir.path().join("fresh");

        assert!(!backend.is_repository(&path));
        backend.init_repository(&path).unwrap();
        assert!(backend.is_repository(&path));
    }

    #[test]
    fn test_setup_remote_and_tracking_url() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let ctx = RepositoryContext::new(dir.path());
        let backend = Git2Backend::new();

        let remote = RemoteConfig {
            url: "https://example.com/org/repo".into(),
            username: "alice".into(),
            password: "pw".into(),
            connection_type: crate::models::ConnectionType::Https,
            ..RemoteConfig::default()
        };
        backend.setup_remote(&ctx, &remote).unwrap();

        let url = backend.tracking_remote_url(&ctx).unwrap();
        assert_eq!(url.as_deref(), Some("https://alice:pw@example.com/org/repo"));
    }

    #[test]
    fn test_config_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        repo.config().unwrap().set_bool("pull.rebase", true).unwrap();
        let ctx = RepositoryContext::new(dir.path());
        let backend = Git2Backend::new();

        assert_eq!(backend.config_bool(&ctx, "pull.rebase").unwrap(), Some(true));
        assert_eq!(
            backend.config_string(&ctx, "user.name").unwrap().as_deref(),
            Some("Test")
        );
        assert_eq!(backend.config_string(&ctx, "gitsync.absent").unwrap(), None);
    }

    #[test]
    fn test_remove_vcs_keeps_working_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "keep.txt", "data", "init");
        drop(repo);

        let ctx = RepositoryContext::new(dir.path());
        Git2Backend::new().remove_vcs(&ctx).unwrap();

        assert!(!dir.path().join(".git").exists());
        assert!(dir.path().join("keep.txt").exists());
        assert!(ctx.repo_path().is_none());
    }

    #[test]
    fn test_open_without_repository() {
        let ctx = RepositoryContext::new("/tmp/gitsync-never-created");
        ctx.release_repository();
        assert!(matches!(open(&ctx), Err(GitError::RepositoryNotFound(_))));
    }
}
