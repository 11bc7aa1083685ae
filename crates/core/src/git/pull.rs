//! Pull primitives: merge analysis, fast-forward steps, three-way merge and
//! rebase against the fetched head.
//!
//! The decision of which of these to run lives in the sync engine; this
//! module only executes the individual steps against `git2`.

use std::path::Path;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use git2::build::CheckoutBuilder;
use git2::{
    AnnotatedCommit, CheckoutNotificationType, ErrorCode, IndexEntry, MergeOptions, Oid,
    Rebase, RebaseOptions, Reference, Repository, Sort, Status, StatusOptions, StatusShow,
};
use tracing::{debug, info, instrument, warn};

use super::{default_signature, head_branch_ref, open};
use crate::backend::FastForwardTarget;
use crate::context::RepositoryContext;
use crate::errors::GitError;
use crate::models::{CommitDetails, ConflictEntry, ConflictSide, MergeAnalysis, RebaseOutcome};

/// Stage bits of `IndexEntry::flags`.
const INDEX_STAGE_MASK: u16 = 0x3000;

// ---------------------------------------------------------------------------
// Fetched head
// ---------------------------------------------------------------------------

/// Remote-tracking reference for the current branch: the configured upstream
/// if there is one, else `refs/remotes/<remote>/<branch>`.
fn tracking_reference<'r>(
    repo: &'r Repository,
    ctx: &RepositoryContext,
    branch_ref: &str,
) -> Result<Reference<'r>, GitError> {
    if let Ok(upstream) = repo.branch_upstream_name(branch_ref) {
        if let Some(name) = upstream.as_str() {
            if let Ok(reference) = repo.find_reference(name) {
                return Ok(reference);
            }
        }
    }

    let short = branch_ref.strip_prefix("refs/heads/").unwrap_or(branch_ref);
    let conventional = format!("refs/remotes/{}/{}", ctx.remote_name(), short);
    repo.find_reference(&conventional)
        .map_err(|_| GitError::RefNotFound(conventional))
}

fn fetched_commit<'r>(
    repo: &'r Repository,
    ctx: &RepositoryContext,
) -> Result<AnnotatedCommit<'r>, GitError> {
    let branch_ref = head_branch_ref(repo)?;
    let tracking = tracking_reference(repo, ctx, &branch_ref)?;
    Ok(repo.reference_to_annotated_commit(&tracking)?)
}

/// Classify the fetched head relative to HEAD.
#[instrument(skip(ctx))]
pub(crate) fn merge_analysis(ctx: &RepositoryContext) -> Result<MergeAnalysis, GitError> {
    let repo = open(ctx)?;
    let fetched = fetched_commit(&repo, ctx)?;
    let (analysis, _preference) = repo.merge_analysis(&[&fetched])?;

    let result = MergeAnalysis {
        unborn: analysis.is_unborn(),
        up_to_date: analysis.is_up_to_date(),
        fast_forward: analysis.is_fast_forward(),
        normal: analysis.is_normal(),
    };
    debug!(?result, fetched = %fetched.id(), "merge analysis");
    Ok(result)
}

// ---------------------------------------------------------------------------
// Fast-forward steps
// ---------------------------------------------------------------------------

pub(crate) fn fast_forward_target(ctx: &RepositoryContext) -> Result<FastForwardTarget, GitError> {
    let repo = open(ctx)?;
    let branch_ref = head_branch_ref(&repo)?;
    let tracking = tracking_reference(&repo, ctx, &branch_ref)?;
    let new_oid = tracking.peel_to_commit()?.id().to_string();
    let old_oid = repo.refname_to_id(&branch_ref).ok().map(|o| o.to_string());

    Ok(FastForwardTarget {
        branch_ref,
        old_oid,
        new_oid,
    })
}

/// Write `oid`'s tree into the working directory.
///
/// Conflicting paths do not abort the checkout; they are reported through
/// the checkout notifier and logged.
#[instrument(skip(ctx))]
pub(crate) fn checkout_commit(ctx: &RepositoryContext, oid: &str) -> Result<(), GitError> {
    let repo = open(ctx)?;
    let commit = repo.find_commit(Oid::from_str(oid)?)?;

    let mut conflicts: Vec<String> = Vec::new();
    let result = {
        let mut checkout = CheckoutBuilder::new();
        checkout
            .safe()
            .allow_conflicts(true)
            .notify_on(CheckoutNotificationType::CONFLICT)
            .notify(|_kind, path, _baseline, _target, _workdir| {
                if let Some(path) = path {
                    conflicts.push(path.display().to_string());
                }
                true
            });
        repo.checkout_tree(commit.as_object(), Some(&mut checkout))
    };

    for path in &conflicts {
        warn!(path, "checkout left a conflict");
    }
    result.map_err(|e| GitError::CheckoutFailed(e.message().to_string()))
}

/// Point `branch_ref` at `oid`, creating the reference for an unborn branch.
#[instrument(skip(ctx))]
pub(crate) fn update_branch(ctx: &RepositoryContext, branch_ref: &str, oid: &str) -> Result<(), GitError> {
    let repo = open(ctx)?;
    let target = Oid::from_str(oid)?;
    let message = format!("gitsync: fast-forward to {oid}");

    match repo.find_reference(branch_ref) {
        Ok(mut reference) => {
            reference.set_target(target, &message)?;
        }
        Err(e) if e.code() == ErrorCode::NotFound => {
            repo.reference(branch_ref, target, true, &message)?;
        }
        Err(e) => return Err(e.into()),
    }
    info!(branch_ref, oid, "branch updated");
    Ok(())
}

fn format_time(time: git2::Time) -> String {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60).unwrap_or_else(|| Utc.fix());
    DateTime::from_timestamp(time.seconds(), 0)
        .map(|utc| utc.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S %z").to_string())
        .unwrap_or_default()
}

/// Commits reachable from `new` but not `old`, oldest first.
pub(crate) fn commits_between(
    ctx: &RepositoryContext,
    old: Option<&str>,
    new: &str,
) -> Result<Vec<CommitDetails>, GitError> {
    let repo = open(ctx)?;
    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)?;
    revwalk.push(Oid::from_str(new)?)?;
    if let Some(old) = old {
        revwalk.hide(Oid::from_str(old)?)?;
    }

    let mut commits = Vec::new();
    for oid in revwalk {
        let commit = repo.find_commit(oid?)?;
        let author = commit.author();
        commits.push(CommitDetails {
            sha: commit.id().to_string(),
            first_line: commit.summary().unwrap_or("").to_string(),
            author: author.name().unwrap_or("").to_string(),
            date: format_time(author.when()),
        });
    }
    debug!(count = commits.len(), "collected new commits");
    Ok(commits)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Tracked files modified or deleted in the working directory.
pub(crate) fn has_unstaged_changes(ctx: &RepositoryContext) -> Result<bool, GitError> {
    let repo = open(ctx)?;
    let mut opts = StatusOptions::new();
    opts.show(StatusShow::Workdir)
        .include_untracked(false)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts))?;

    let dirty = Status::WT_MODIFIED | Status::WT_DELETED | Status::WT_TYPECHANGE | Status::WT_RENAMED;
    Ok(statuses.iter().any(|entry| entry.status().intersects(dirty)))
}

fn conflict_entry(ours: &IndexEntry, theirs: &IndexEntry, side: ConflictSide) -> ConflictEntry {
    ConflictEntry {
        filename: String::from_utf8_lossy(&ours.path).into_owned(),
        our_oid: ours.id.to_string(),
        their_oid: theirs.id.to_string(),
        our_timestamp: i64::from(ours.mtime.seconds()),
        their_timestamp: i64::from(theirs.mtime.seconds()),
        our_status: side,
        their_status: side,
        use_ours: false,
    }
}

/// Three-way merge of the fetched head into HEAD.
///
/// Single-sided conflicts are resolved by taking the side that has the entry.
/// Real conflicts are returned and the merge state is left in place for the
/// caller to resolve. A clean merge is committed.
#[instrument(skip(ctx))]
pub(crate) fn merge_fetched(ctx: &RepositoryContext) -> Result<Vec<ConflictEntry>, GitError> {
    let repo = open(ctx)?;
    let branch_ref = head_branch_ref(&repo)?;
    let tracking = tracking_reference(&repo, ctx, &branch_ref)?;
    let fetched = repo.reference_to_annotated_commit(&tracking)?;

    let mut merge_opts = MergeOptions::new();
    let mut checkout = CheckoutBuilder::new();
    checkout.safe().allow_conflicts(true).conflict_style_merge(true);
    repo.merge(&[&fetched], Some(&mut merge_opts), Some(&mut checkout))?;

    let mut index = repo.index()?;
    let mut conflicts = Vec::new();
    let mut resolved: Vec<IndexEntry> = Vec::new();

    if index.has_conflicts() {
        for conflict in index.conflicts()? {
            let conflict = conflict?;
            match (conflict.ancestor, conflict.our, conflict.their) {
                (ancestor, Some(ours), Some(theirs)) => {
                    let side = if ancestor.is_some() {
                        ConflictSide::Changed
                    } else {
                        ConflictSide::Added
                    };
                    conflicts.push(conflict_entry(&ours, &theirs, side));
                }
                (_, Some(only), None) | (_, None, Some(only)) => resolved.push(only),
                (_, None, None) => {}
            }
        }
    }

    for mut entry in resolved {
        let path = String::from_utf8_lossy(&entry.path).into_owned();
        index.conflict_remove(Path::new(&path))?;
        entry.flags &= !INDEX_STAGE_MASK;
        index.add(&entry)?;
        debug!(path, "auto-resolved single-sided conflict");
    }

    if !conflicts.is_empty() {
        index.write()?;
        warn!(count = conflicts.len(), "merge left conflicts");
        return Ok(conflicts);
    }

    index.write()?;

    let tree = repo.find_tree(index.write_tree()?)?;
    let head_commit = repo.head()?.peel_to_commit()?;
    let their_commit = repo.find_commit(fetched.id())?;
    let signature = default_signature(&repo, ctx)?;
    let message = format!(
        "Merge {} into {}",
        tracking.shorthand().unwrap_or("fetched head"),
        branch_ref.strip_prefix("refs/heads/").unwrap_or(&branch_ref)
    );
    let oid = repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        &message,
        &tree,
        &[&head_commit, &their_commit],
    )?;
    repo.cleanup_state()?;

    info!(sha = %oid, "merge committed");
    Ok(Vec::new())
}

// ---------------------------------------------------------------------------
// Rebase
// ---------------------------------------------------------------------------

/// Replay HEAD's local commits onto the fetched head.
///
/// The rebase is aborted as soon as any step leaves conflicts in the index,
/// so no partial rebase survives.
#[instrument(skip(ctx))]
pub(crate) fn rebase_fetched(ctx: &RepositoryContext) -> Result<RebaseOutcome, GitError> {
    let repo = open(ctx)?;
    let signature = default_signature(&repo, ctx)?;
    let fetched = fetched_commit(&repo, ctx)?;

    let mut opts = RebaseOptions::new();
    let mut rebase = repo.rebase(None, Some(&fetched), None, Some(&mut opts))?;
    let mut replayed = 0usize;

    while let Some(step) = rebase.next() {
        if let Err(e) = step {
            warn!(error = %e, "rebase step failed; aborting");
            abort_quietly(&mut rebase);
            return Err(e.into());
        }

        if repo.index()?.has_conflicts() {
            warn!(step = replayed, "rebase step conflicts; aborting");
            rebase.abort()?;
            return Ok(RebaseOutcome::Conflicted);
        }

        match rebase.commit(None, &signature, None) {
            Ok(oid) => {
                replayed += 1;
                debug!(sha = %oid, "replayed commit");
            }
            // The change is already upstream; nothing to replay.
            Err(e) if e.code() == ErrorCode::Applied => {}
            Err(e) => {
                abort_quietly(&mut rebase);
                return Err(e.into());
            }
        }
    }

    rebase.finish(Some(&signature))?;
    repo.cleanup_state()?;
    info!(replayed, "rebase completed");
    Ok(RebaseOutcome::Completed { replayed })
}

/// Abort after a failed step. The step's error is the one reported, so an
/// abort failure is only logged.
fn abort_quietly(rebase: &mut Rebase<'_>) {
    if let Err(e) = rebase.abort() {
        warn!(error = %e, "rebase abort failed");
    }
}
