//! Domain model types used throughout gitsync.
//!
//! These types bridge the sync engine, the backend façade, and the handlers.
//! Every result enum is a closed set; callers branch on the variant instead of
//! matching error strings.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Remote classification
// ---------------------------------------------------------------------------

/// How the active remote is reached. Decides which credential mechanisms are
/// attempted at all.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Local,
    Ssh,
    Https,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Ssh => write!(f, "ssh"),
            Self::Https => write!(f, "https"),
        }
    }
}

/// Remote settings handed once to repository initialization / remote setup.
/// Not retained after use.
#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub ssh_key: Option<PathBuf>,
    pub connection_type: ConnectionType,
}

/// Author / committer identity for new commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge analysis
// ---------------------------------------------------------------------------

/// Classification of the fetched head relative to the current branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeAnalysis {
    pub unborn: bool,
    pub up_to_date: bool,
    pub fast_forward: bool,
    pub normal: bool,
}

impl MergeAnalysis {
    pub const UNBORN: Self = Self {
        unborn: true,
        up_to_date: false,
        fast_forward: false,
        normal: false,
    };
    pub const UP_TO_DATE: Self = Self {
        unborn: false,
        up_to_date: true,
        fast_forward: false,
        normal: false,
    };
    pub const FAST_FORWARD: Self = Self {
        unborn: false,
        up_to_date: false,
        fast_forward: true,
        normal: true,
    };
    pub const NORMAL: Self = Self {
        unborn: false,
        up_to_date: false,
        fast_forward: false,
        normal: true,
    };

    /// No flag set: the engine could not classify the relationship.
    pub fn is_none(&self) -> bool {
        !(self.unborn || self.up_to_date || self.fast_forward || self.normal)
    }
}

// ---------------------------------------------------------------------------
// Conflicts and commit log
// ---------------------------------------------------------------------------

/// Per-side label of a conflicting file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSide {
    Added,
    Changed,
}

impl fmt::Display for ConflictSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Changed => write!(f, "changed"),
        }
    }
}

/// A file left conflicted by a three-way merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictEntry {
    pub filename: String,
    pub our_oid: String,
    pub their_oid: String,
    pub our_timestamp: i64,
    pub their_timestamp: i64,
    pub our_status: ConflictSide,
    pub their_status: ConflictSide,
    /// Resolution choice, filled in by the caller's resolution UI.
    pub use_ours: bool,
}

/// A commit that arrived through a fast-forward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitDetails {
    pub sha: String,
    pub first_line: String,
    pub author: String,
    pub date: String,
}

/// Outcome of replaying local commits onto the fetched head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// Every step was replayed and the rebase finished.
    Completed { replayed: usize },
    /// A step produced conflicts; the rebase was aborted.
    Conflicted,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Classified status of a single working-tree file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatusKind {
    Untracked,
    Current,
    Modified,
    Added,
    Deleted,
    Behind,
    Ahead,
    Conflicted,
    Ignored,
}

impl fmt::Display for FileStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Untracked => "untracked",
            Self::Current => "current",
            Self::Modified => "modified",
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Behind => "behind",
            Self::Ahead => "ahead",
            Self::Conflicted => "conflicted",
            Self::Ignored => "ignored",
        };
        f.write_str(label)
    }
}

/// Engine-reported status of one path, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub relative_path: String,
    pub status: FileStatusKind,
    pub raw_status: u32,
}

/// Status of a file keyed by absolute path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileStatus {
    pub path: PathBuf,
    pub status: FileStatusKind,
    /// Raw engine status bits, kept for diagnostics.
    pub raw_status: u32,
}

/// Paths touched by commits on only one side of HEAD / upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Changed by local commits not yet pushed.
    pub local: BTreeSet<String>,
    /// Changed by upstream commits not yet pulled.
    pub remote: BTreeSet<String>,
}

impl Divergence {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }
}

/// Which branch namespace to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchScope {
    Local,
    Remote,
}

// ---------------------------------------------------------------------------
// Result enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InitResult {
    Success,
    AlreadyExists,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BranchResult {
    Success,
    BranchNotFound,
    CheckoutFailed,
    Error,
}

/// Outcome of a pull. Failure codes are negative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i8)]
pub enum PullResult {
    /// The engine reported no merge-analysis flag; not handled automatically.
    ManualResolutionRequired = -4,
    /// Local modifications block merge / rebase.
    DirtyWorkdir = -3,
    MergeFailed = -2,
    Error = -1,
    Success = 0,
    UpToDate = 1,
    FastForward = 2,
}

impl PullResult {
    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn is_failure(self) -> bool {
        self.code() < 0
    }
}

impl fmt::Display for PullResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ManualResolutionRequired => "manual resolution required",
            Self::DirtyWorkdir => "working tree has local modifications",
            Self::MergeFailed => "merge failed",
            Self::Error => "error",
            Self::Success => "merged",
            Self::UpToDate => "already up to date",
            Self::FastForward => "fast-forwarded",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PushResult {
    Success,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommitResult {
    Success,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FetchResult {
    Success,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CloneResult {
    Success,
    Cancelled,
    Error,
}
