//! End-to-end pull / push / status scenarios against real repositories.
//!
//! Every test builds a bare "origin" inside a temp dir, a clone for the local
//! user (driven through the handlers) and, where needed, a second clone that
//! plays a collaborator pushing upstream. No network I/O.
//!
//! Bare remotes are named without a `.git` suffix: such paths classify as SSH
//! remotes, which would make credential negotiation demand keys.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use git2::{Repository, Signature, Time};
use tempfile::TempDir;

use gitsync_core::handlers::{
    CloneHandler, FetchHandler, HandlerCore, IndexHandler, InitHandler, OperationHandler,
    PushHandler, StatusHandler,
};
use gitsync_core::models::{CloneResult, FetchResult, FileStatusKind, InitResult, PullResult, PushResult};
use gitsync_core::progress::ProgressSink;
use gitsync_core::{Git2Backend, GitBackend, RepositoryContext};

// ===========================================================================
// Helpers
// ===========================================================================

const BASE_TIME: i64 = 1_700_000_000;

struct Fixture {
    tmp: TempDir,
    origin: PathBuf,
}

impl Fixture {
    /// Bare origin seeded with one commit holding `shared.txt`.
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let origin = tmp.path().join("origin");
        Repository::init_bare(&origin).unwrap();

        let seed_dir = tmp.path().join("seed");
        let seed = Repository::init(&seed_dir).unwrap();
        commit_file(&seed, "shared.txt", "base\n", "base", 0);
        seed.remote("origin", origin.to_str().unwrap()).unwrap();
        push_head(&seed);

        Self { tmp, origin }
    }

    fn origin_url(&self) -> &str {
        self.origin.to_str().unwrap()
    }

    /// Plain git2 clone acting as another user.
    fn collaborator(&self, name: &str) -> Repository {
        Repository::clone(self.origin_url(), self.tmp.path().join(name)).unwrap()
    }

    /// Clone through the handler API; returns the context bound to it.
    fn local_clone(&self, name: &str) -> (Arc<RepositoryContext>, PathBuf) {
        let dest = self.tmp.path().join(name);
        let ctx = Arc::new(RepositoryContext::new(&dest));
        let mut handler = CloneHandler::new(core(&ctx));
        assert_eq!(
            handler.clone_repository(self.origin_url(), &dest),
            Some(CloneResult::Success),
            "clone failed: {:?}",
            handler.drain_errors()
        );
        (ctx, dest)
    }
}

fn backend() -> Arc<dyn GitBackend> {
    Arc::new(Git2Backend::new())
}

fn core(ctx: &Arc<RepositoryContext>) -> HandlerCore {
    HandlerCore::new(Arc::clone(ctx), backend())
}

/// Commit `name` with a fixed signature `offset` seconds after the base time.
fn commit_file(repo: &Repository, name: &str, contents: &str, message: &str, offset: i64) -> git2::Oid {
    let path = repo.workdir().unwrap().join(name);
    std::fs::write(&path, contents).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::new("Tester", "tester@example.com", &Time::new(BASE_TIME + offset, 0)).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Delete `name` from the working tree and commit the deletion.
fn commit_deletion(repo: &Repository, name: &str, message: &str, offset: i64) -> git2::Oid {
    std::fs::remove_file(repo.workdir().unwrap().join(name)).unwrap();

    let mut index = repo.index().unwrap();
    index.remove_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::new("Tester", "tester@example.com", &Time::new(BASE_TIME + offset, 0)).unwrap();
    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
        .unwrap()
}

fn push_head(repo: &Repository) {
    let head = repo.head().unwrap();
    let name = head.name().unwrap().to_string();
    let mut remote = repo.find_remote("origin").unwrap();
    remote.push(&[format!("{name}:{name}")], None).unwrap();
}

fn head_commit(path: &Path) -> git2::Oid {
    Repository::open(path).unwrap().head().unwrap().target().unwrap()
}

fn pull_with(ctx: &Arc<RepositoryContext>) -> (Option<PullResult>, FetchHandler) {
    let mut handler = FetchHandler::new(core(ctx));
    let result = handler.pull();
    (result, handler)
}

/// Sink that requests cancellation on the first pulse.
struct CancelOnPulse(Arc<RepositoryContext>);

impl ProgressSink for CancelOnPulse {
    fn set_current_progress(&self, _fraction: f64) {}
    fn report(&self, _message: &str) {}
    fn pulse(&self, _message: &str) {
        self.0.cancel();
    }
    fn hide(&self) {}
}

/// Sink that requests cancellation on the first determinate progress update,
/// i.e. once objects are already being transferred.
struct CancelOnTransfer {
    ctx: Arc<RepositoryContext>,
    updates: AtomicUsize,
}

impl ProgressSink for CancelOnTransfer {
    fn set_current_progress(&self, _fraction: f64) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.ctx.cancel();
    }
    fn report(&self, _message: &str) {}
    fn pulse(&self, _message: &str) {}
    fn hide(&self) {}
}

// ===========================================================================
// Pull
// ===========================================================================

#[test]
fn test_pull_right_after_clone_is_up_to_date() {
    let fx = Fixture::new();
    let (ctx, _) = fx.local_clone("alice");

    let (result, _) = pull_with(&ctx);
    assert_eq!(result, Some(PullResult::UpToDate));
    assert!(!ctx.is_busy());
}

#[test]
fn test_fast_forward_collects_new_commits_oldest_first() {
    let fx = Fixture::new();
    let (ctx, alice) = fx.local_clone("alice");

    let bob = fx.collaborator("bob");
    commit_file(&bob, "one.txt", "1\n", "first upstream", 10);
    commit_file(&bob, "two.txt", "2\n", "second upstream", 20);
    push_head(&bob);

    let (result, handler) = pull_with(&ctx);
    assert_eq!(result, Some(PullResult::FastForward));

    let log = handler.commit_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].first_line, "first upstream");
    assert_eq!(log[1].first_line, "second upstream");
    assert!(log.windows(2).all(|w| w[0].date <= w[1].date));

    assert!(alice.join("two.txt").exists());
    assert_eq!(head_commit(&alice), bob.head().unwrap().target().unwrap());
}

#[test]
fn test_rebase_replays_local_commit_onto_upstream() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");
    let alice = Repository::open(&alice_dir).unwrap();
    alice.config().unwrap().set_bool("pull.rebase", true).unwrap();

    let bob = fx.collaborator("bob");
    let upstream = commit_file(&bob, "bob.txt", "B\n", "B", 10);
    push_head(&bob);
    commit_file(&alice, "alice.txt", "A\n", "A", 20);

    let (result, mut handler) = pull_with(&ctx);
    assert_eq!(result, Some(PullResult::Success), "{:?}", handler.drain_errors());

    let head = alice.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.summary(), Some("A"));
    assert_eq!(head.parent_count(), 1);
    assert_eq!(head.parent_id(0).unwrap(), upstream);
    assert!(alice_dir.join("bob.txt").exists());
    assert!(alice_dir.join("alice.txt").exists());
    assert_eq!(alice.state(), git2::RepositoryState::Clean);
}

#[test]
fn test_clean_merge_creates_merge_commit() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");
    let alice = Repository::open(&alice_dir).unwrap();

    let bob = fx.collaborator("bob");
    commit_file(&bob, "bob.txt", "B\n", "B", 10);
    push_head(&bob);
    commit_file(&alice, "alice.txt", "A\n", "A", 20);

    let (result, _) = pull_with(&ctx);
    assert_eq!(result, Some(PullResult::Success));

    let head = alice.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.parent_count(), 2);
    assert_eq!(alice.state(), git2::RepositoryState::Clean);
    assert!(alice_dir.join("bob.txt").exists());
}

#[test]
fn test_conflicting_merge_reports_conflicts() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");
    let alice = Repository::open(&alice_dir).unwrap();

    let bob = fx.collaborator("bob");
    commit_file(&bob, "shared.txt", "bob\n", "bob edit", 10);
    push_head(&bob);
    commit_file(&alice, "shared.txt", "alice\n", "alice edit", 20);

    let (result, mut handler) = pull_with(&ctx);
    assert_eq!(result, Some(PullResult::MergeFailed));

    let conflicts = handler.conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].filename, "shared.txt");
    assert!(!handler.drain_errors().is_empty());
    // merge state is left for the caller to resolve
    assert_eq!(alice.state(), git2::RepositoryState::Merge);
}

#[test]
fn test_rebase_conflict_is_aborted_cleanly() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");
    let alice = Repository::open(&alice_dir).unwrap();
    alice.config().unwrap().set_bool("pull.rebase", true).unwrap();

    let bob = fx.collaborator("bob");
    commit_file(&bob, "shared.txt", "bob\n", "bob edit", 10);
    push_head(&bob);
    let local = commit_file(&alice, "shared.txt", "alice\n", "alice edit", 20);

    let (result, _) = pull_with(&ctx);
    assert_eq!(result, Some(PullResult::MergeFailed));
    assert_eq!(alice.state(), git2::RepositoryState::Clean);
    assert_eq!(head_commit(&alice_dir), local);
}

#[test]
fn test_dirty_workdir_blocks_merge() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");
    let alice = Repository::open(&alice_dir).unwrap();

    let bob = fx.collaborator("bob");
    commit_file(&bob, "bob.txt", "B\n", "B", 10);
    push_head(&bob);
    let local = commit_file(&alice, "alice.txt", "A\n", "A", 20);
    std::fs::write(alice_dir.join("shared.txt"), "uncommitted\n").unwrap();

    let (result, _) = pull_with(&ctx);
    assert_eq!(result, Some(PullResult::DirtyWorkdir));
    assert_eq!(head_commit(&alice_dir), local);
    assert_eq!(
        std::fs::read_to_string(alice_dir.join("shared.txt")).unwrap(),
        "uncommitted\n"
    );
}

#[test]
fn test_one_sided_conflict_is_resolved_automatically() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");
    let alice = Repository::open(&alice_dir).unwrap();

    let bob = fx.collaborator("bob");
    commit_file(&bob, "shared.txt", "bob\n", "bob edit", 10);
    push_head(&bob);
    commit_deletion(&alice, "shared.txt", "alice delete", 20);

    let (result, mut handler) = pull_with(&ctx);
    assert_eq!(result, Some(PullResult::Success), "{:?}", handler.drain_errors());
    assert!(handler.conflicts().is_empty());
    assert_eq!(alice.state(), git2::RepositoryState::Clean);

    // the side that still has the file wins
    let head = alice.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.parent_count(), 2);
    assert!(head.tree().unwrap().get_path(Path::new("shared.txt")).is_ok());
    assert_eq!(std::fs::read_to_string(alice_dir.join("shared.txt")).unwrap(), "bob\n");
    assert!(!alice.index().unwrap().has_conflicts());
}

// ===========================================================================
// Single flight & cancellation
// ===========================================================================

#[test]
fn test_concurrent_pull_is_turned_away() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");
    let bob = fx.collaborator("bob");
    commit_file(&bob, "bob.txt", "B\n", "B", 10);
    push_head(&bob);
    let before = head_commit(&alice_dir);

    let held = ctx.try_acquire().unwrap();
    let worker_ctx = Arc::clone(&ctx);
    let declined = std::thread::spawn(move || {
        let mut handler = FetchHandler::new(core(&worker_ctx));
        (handler.pull(), handler.errors().is_empty())
    })
    .join()
    .unwrap();
    assert_eq!(declined, (None, true));
    assert_eq!(head_commit(&alice_dir), before);
    drop(held);

    let (result, _) = pull_with(&ctx);
    assert_eq!(result, Some(PullResult::FastForward));
}

#[test]
fn test_cancel_before_connecting_is_reported_as_cancelled() {
    let fx = Fixture::new();
    let (ctx, _) = fx.local_clone("alice");

    let cancelling = core(&ctx).with_progress_sink(Arc::new(CancelOnPulse(Arc::clone(&ctx))));
    let mut handler = FetchHandler::new(cancelling);
    assert_eq!(handler.fetch(), Some(FetchResult::Cancelled));
    assert!(handler.pop_error().unwrap().contains("cancelled"));

    // the cancellation was consumed by the fetch it stopped
    assert!(!ctx.is_cancelled());
    let mut handler = FetchHandler::new(core(&ctx));
    assert_eq!(handler.fetch(), Some(FetchResult::Success));
}

#[test]
fn test_cancel_mid_transfer_is_reported_as_cancelled() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");
    let before = head_commit(&alice_dir);

    let bob = fx.collaborator("bob");
    commit_file(&bob, "one.txt", "1\n", "first upstream", 10);
    commit_file(&bob, "two.txt", "2\n", "second upstream", 20);
    push_head(&bob);

    let sink = Arc::new(CancelOnTransfer {
        ctx: Arc::clone(&ctx),
        updates: AtomicUsize::new(0),
    });
    let mut handler = FetchHandler::new(core(&ctx).with_progress_sink(sink.clone()));
    assert_eq!(handler.fetch(), Some(FetchResult::Cancelled));
    // cancellation came from a transfer callback, not the pre-connect check
    assert!(sink.updates.load(Ordering::SeqCst) > 0);
    let message = handler.pop_error().unwrap();
    assert!(message.contains("cancelled"), "{message}");
    assert!(!ctx.is_cancelled());
    assert_eq!(head_commit(&alice_dir), before);

    let mut handler = FetchHandler::new(core(&ctx));
    assert_eq!(handler.fetch(), Some(FetchResult::Success));
}

// ===========================================================================
// Push, status, index
// ===========================================================================

#[test]
fn test_push_updates_only_current_branch() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");
    let alice = Repository::open(&alice_dir).unwrap();
    let local = commit_file(&alice, "alice.txt", "A\n", "A", 10);
    let head_name = alice.head().unwrap().name().unwrap().to_string();

    let mut handler = PushHandler::new(core(&ctx));
    assert_eq!(handler.push(), Some(PushResult::Success), "{:?}", handler.drain_errors());

    let origin = Repository::open_bare(&fx.origin).unwrap();
    assert_eq!(origin.refname_to_id(&head_name).unwrap(), local);
}

#[test]
fn test_status_marks_files_behind_after_fetch() {
    let fx = Fixture::new();
    let (ctx, alice_dir) = fx.local_clone("alice");

    let bob = fx.collaborator("bob");
    commit_file(&bob, "shared.txt", "changed upstream\n", "upstream edit", 10);
    push_head(&bob);

    assert_eq!(FetchHandler::new(core(&ctx)).fetch(), Some(FetchResult::Success));

    let mut status = StatusHandler::new(core(&ctx));
    assert!(!status.has_local_commits());
    let map = status.file_status_with_remote(None);
    assert_eq!(map[&alice_dir.join("shared.txt")].status, FileStatusKind::Behind);
}

#[test]
fn test_no_upstream_divergence() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("solo");
    let ctx = Arc::new(RepositoryContext::new(&path));

    assert_eq!(
        InitHandler::new(core(&ctx)).init_repository(&path),
        Some(InitResult::Success)
    );
    let repo = Repository::open(&path).unwrap();
    commit_file(&repo, "a.txt", "a\n", "init", 0);

    let mut status = StatusHandler::new(core(&ctx));
    assert!(status.different_files().is_empty());
    assert!(status.has_local_commits());
    assert!(status.errors().is_empty());
}

#[test]
fn test_index_add_then_remove_restores_index() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("repo");
    let repo = Repository::init(&path).unwrap();
    commit_file(&repo, "tracked.txt", "t\n", "init", 0);
    std::fs::write(path.join("untracked.txt"), "u\n").unwrap();

    let entries = |repo: &Repository| -> Vec<Vec<u8>> {
        let mut index = repo.index().unwrap();
        index.read(true).unwrap();
        index.iter().map(|e| e.path).collect()
    };
    let before = entries(&repo);

    let ctx = Arc::new(RepositoryContext::new(&path));
    let mut handler = IndexHandler::new(core(&ctx));
    assert!(handler.add(path.join("untracked.txt")));
    assert_eq!(handler.perform_add(), Some(true));
    assert_ne!(entries(&repo), before);

    assert!(handler.remove(path.join("untracked.txt")));
    assert_eq!(handler.perform_remove(), Some(true));
    assert_eq!(entries(&repo), before);
}
