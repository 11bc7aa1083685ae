//! Error types for the gitsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type. Handlers never surface these directly: they convert
//! them into closed result enums plus entries in an
//! [`ErrorLog`](crate::error_log::ErrorLog).

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from version-control engine operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The context has no repository installed, or the path is not a repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// The named remote is not configured.
    #[error("git remote not found: {0}")]
    RemoteNotFound(String),

    /// The user cancelled a transfer through the context's cancel flag.
    #[error("{operation} cancelled by user")]
    Cancelled { operation: String },

    /// The remote refused every credential we could offer.
    #[error("authentication failed during {operation}: {detail}")]
    Auth { operation: String, detail: String },

    /// Connection-level failure (DNS, TCP, TLS, HTTP status).
    #[error("network error during {operation}: {detail}")]
    Network { operation: String, detail: String },

    /// Push was rejected by the remote (e.g. non-fast-forward).
    #[error("push rejected for '{refname}': {detail}")]
    PushRejected { refname: String, detail: String },

    /// Writing the target tree into the working directory failed.
    #[error("checkout failed: {0}")]
    CheckoutFailed(String),

    /// A path could not be added to or removed from the index.
    #[error("index update failed for '{path}': {detail}")]
    IndexUpdate { path: String, detail: String },

    /// HEAD does not point at a commit yet.
    #[error("HEAD is unborn")]
    UnbornHead,

    /// A `git2` library error that did not fit a finer category.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GitError {
    /// Classify a `git2` error raised by a network operation.
    ///
    /// Callback aborts (`ErrorCode::User`) become [`GitError::Cancelled`] when
    /// the cancel flag was set, which is how transfer callbacks signal a
    /// user-requested abort.
    pub fn from_transport(operation: &str, err: git2::Error, cancelled: bool) -> Self {
        use git2::{ErrorClass, ErrorCode};

        if cancelled || err.code() == ErrorCode::User {
            return Self::Cancelled {
                operation: operation.to_string(),
            };
        }

        let message = err.message().to_string();
        let lower = message.to_ascii_lowercase();

        if err.code() == ErrorCode::Auth
            || err.class() == ErrorClass::Ssh
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("authentication")
            || lower.contains("credentials")
            || lower.contains("permission denied")
        {
            return Self::Auth {
                operation: operation.to_string(),
                detail: message,
            };
        }

        if matches!(
            err.class(),
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl
        ) || lower.contains("timed out")
            || lower.contains("connection")
        {
            return Self::Network {
                operation: operation.to_string(),
                detail: message,
            };
        }

        Self::Git2Error(err)
    }

    /// True for the distinguished user-cancellation condition.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// ---------------------------------------------------------------------------
// Credential negotiation errors
// ---------------------------------------------------------------------------

/// Errors from the credential negotiator.
///
/// Note: messages never include secret values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Every mechanism the server accepts has already been offered.
    #[error("no more credentials to try for '{url}'{}", last_error_suffix(.last_error))]
    Exhausted {
        url: String,
        last_error: Option<String>,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Secret store errors
// ---------------------------------------------------------------------------

/// Errors from secret storage operations.
///
/// Note: messages intentionally do not include secret values.
#[derive(Debug, Error)]
pub enum SecretError {
    /// Failed to read from secret storage.
    #[error("failed to read secret: {0}")]
    ReadError(String),

    /// Failed to write to secret storage.
    #[error("failed to write secret: {0}")]
    WriteError(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
