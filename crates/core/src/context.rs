//! Per-repository state shared by every handler.
//!
//! A [`RepositoryContext`] holds the repository location, the classified
//! remote, cached credentials, the credential negotiation state, the
//! single-flight guard for mutating operations, and the cancellation flag.
//! It performs no I/O of its own beyond delegating to the secret store and the
//! SSH config reader.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::config::{AppConfig, SshConfig, SyncConfig};
use crate::credentials::negotiator::{Credential, CredentialAttempt, CredentialRequest, CredentialSource};
use crate::credentials::ssh_config;
use crate::errors::CredentialError;
use crate::git::remote_url::{derive_connection_type, redact_url, remote_host};
use crate::models::{ConnectionType, Identity};
use crate::secrets::{MemorySecretStore, SecretStore};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared cooperative-cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Single-flight guard
// ---------------------------------------------------------------------------

/// Proof that the holder owns the context's mutating-operation slot.
///
/// Dropping the guard frees the slot and clears any pending cancellation, so
/// a cancel request affects exactly one operation.
#[must_use = "the operation slot is released as soon as the guard is dropped"]
pub struct OperationGuard<'a> {
    ctx: &'a RepositoryContext,
}

impl OperationGuard<'_> {
    pub fn context(&self) -> &RepositoryContext {
        self.ctx
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.ctx.cancel.reset();
        self.ctx.busy.store(false, Ordering::SeqCst);
        debug!("released repository operation slot");
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct RemoteState {
    url: String,
    connection_type: ConnectionType,
}

/// State for one repository, shared by all handlers bound to it.
pub struct RepositoryContext {
    repo_path: RwLock<Option<PathBuf>>,
    project_dir: Option<PathBuf>,
    remote_name: String,
    remote: RwLock<RemoteState>,
    username: RwLock<String>,
    password: Mutex<Option<String>>,
    secret_store: Arc<dyn SecretStore>,
    ssh: SshConfig,
    preferred_ssh_key: RwLock<Option<PathBuf>>,
    ssh_keys: OnceLock<Vec<PathBuf>>,
    attempt: Mutex<CredentialAttempt>,
    last_error: Mutex<Option<String>>,
    sync: SyncConfig,
    fallback_identity: Identity,
    busy: AtomicBool,
    cancel: CancelFlag,
}

impl RepositoryContext {
    /// Context for a repository at `repo_path` with default settings.
    ///
    /// The path does not need to exist yet: clone and init install it later.
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self::from_config(
            &AppConfig::for_repository(repo_path),
            Arc::new(MemorySecretStore::new()),
        )
    }

    /// Build a context from application config.
    pub fn from_config(config: &AppConfig, secret_store: Arc<dyn SecretStore>) -> Self {
        let url = config.remote.url.trim().to_string();
        let connection_type = derive_connection_type(&url);
        Self {
            repo_path: RwLock::new(Some(config.repository.path.clone())),
            project_dir: config.repository.project_dir.clone(),
            remote_name: config.repository.remote_name.clone(),
            remote: RwLock::new(RemoteState {
                url,
                connection_type,
            }),
            username: RwLock::new(config.remote.username.clone()),
            password: Mutex::new(None),
            secret_store,
            ssh: config.ssh.clone(),
            preferred_ssh_key: RwLock::new(config.remote.ssh_key.clone()),
            ssh_keys: OnceLock::new(),
            attempt: Mutex::new(CredentialAttempt::default()),
            last_error: Mutex::new(None),
            sync: config.sync.clone(),
            fallback_identity: config.identity.identity(),
            busy: AtomicBool::new(false),
            cancel: CancelFlag::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Repository handle
    // -----------------------------------------------------------------------

    /// Working directory of the installed repository, if any.
    pub fn repo_path(&self) -> Option<PathBuf> {
        read(&self.repo_path).clone()
    }

    /// Install (or replace) the repository handle.
    pub fn set_repo_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        info!(path = %path.display(), "installing repository handle");
        *write(&self.repo_path) = Some(path);
    }

    /// Drop the repository handle. Files on disk are left alone.
    pub fn release_repository(&self) {
        *write(&self.repo_path) = None;
    }

    /// Root used to build absolute status paths.
    pub fn project_root(&self) -> Option<PathBuf> {
        self.project_dir.clone().or_else(|| self.repo_path())
    }

    /// Conventional remote name (default `origin`).
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn sync_settings(&self) -> &SyncConfig {
        &self.sync
    }

    /// Identity used when the repository has no configured signature.
    pub fn fallback_identity(&self) -> &Identity {
        &self.fallback_identity
    }

    // -----------------------------------------------------------------------
    // Remote
    // -----------------------------------------------------------------------

    pub fn remote_url(&self) -> String {
        read(&self.remote).url.clone()
    }

    pub fn connection_type(&self) -> ConnectionType {
        read(&self.remote).connection_type
    }

    /// Record a new remote URL and re-derive the connection type from it.
    pub fn set_remote_url(&self, url: &str) {
        let url = url.trim().to_string();
        let connection_type = derive_connection_type(&url);
        debug!(url = %redact_url(&url), %connection_type, "updating remote info");
        *write(&self.remote) = RemoteState {
            url,
            connection_type,
        };
    }

    pub fn username(&self) -> String {
        read(&self.username).clone()
    }

    pub fn set_username(&self, username: &str) {
        *write(&self.username) = username.to_string();
    }

    /// Password for the active remote.
    ///
    /// The secret store is consulted once, on the first call made while a
    /// non-local remote is configured; that answer (including "nothing
    /// stored") is cached for the lifetime of the context.
    pub fn password(&self) -> String {
        let mut cache = lock(&self.password);
        if let Some(cached) = cache.as_ref() {
            return cached.clone();
        }

        let remote = self.remote_url();
        if self.connection_type() == ConnectionType::Local || remote.is_empty() {
            return String::new();
        }

        let username = self.username();
        let secret = match self.secret_store.get_secret(&remote, &username) {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "secret store lookup failed");
                String::new()
            }
        };
        *cache = Some(secret.clone());
        secret
    }

    /// Override the cached password.
    pub fn set_password(&self, password: &str) {
        *lock(&self.password) = Some(password.to_string());
    }

    pub fn secret_store(&self) -> &Arc<dyn SecretStore> {
        &self.secret_store
    }

    /// Key to try before any discovered key.
    pub fn set_preferred_ssh_key(&self, key: Option<PathBuf>) {
        *write(&self.preferred_ssh_key) = key;
    }

    /// Ordered candidate private keys for SSH key-file authentication.
    ///
    /// Discovered keys are collected once per context; the preferred key (if
    /// any, and if it exists) always comes first.
    pub fn ssh_key_candidates(&self) -> Vec<PathBuf> {
        let discovered = self.ssh_keys.get_or_init(|| {
            let host = remote_host(&self.remote_url());
            let keys = ssh_config::candidate_keys(host.as_deref(), &self.ssh);
            debug!(count = keys.len(), "collected ssh key candidates");
            keys
        });

        let mut keys = Vec::with_capacity(discovered.len() + 1);
        if let Some(preferred) = read(&self.preferred_ssh_key).as_ref() {
            if preferred.is_file() {
                keys.push(preferred.clone());
            }
        }
        for key in discovered {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    // -----------------------------------------------------------------------
    // Credential negotiation
    // -----------------------------------------------------------------------

    /// Start a new connection attempt: every mechanism becomes available again
    /// and the SSH key cursor returns to the first candidate.
    pub fn reset_attempt(&self) {
        lock(&self.attempt).reset();
        *lock(&self.last_error) = None;
    }

    /// Answer one authentication challenge from the transport.
    pub fn negotiate(
        &self,
        url: &str,
        username_from_url: Option<&str>,
        allowed: crate::credentials::AuthMechanisms,
    ) -> Result<Credential, CredentialError> {
        let last_error = lock(&self.last_error).clone();
        let request = CredentialRequest {
            url,
            username_from_url,
            allowed,
            last_error: last_error.as_deref(),
        };
        let mut attempt = lock(&self.attempt);
        attempt.next_credential(&request, self)
    }

    /// Remember the most recent transport error text for diagnostics.
    pub fn record_transport_error(&self, message: &str) {
        *lock(&self.last_error) = Some(message.to_string());
    }

    pub fn last_transport_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    // -----------------------------------------------------------------------
    // Single flight & cancellation
    // -----------------------------------------------------------------------

    /// Claim the mutating-operation slot without blocking.
    ///
    /// Returns `None` while another mutating operation is in flight.
    pub fn try_acquire(&self) -> Option<OperationGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("repository operation already in flight");
            return None;
        }
        Some(OperationGuard { ctx: self })
    }

    /// True while a mutating operation holds the slot.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Request cancellation of the operation in flight.
    pub fn cancel(&self) {
        info!("cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Shared handle to the cancel flag, for callbacks that outlive a borrow.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

impl CredentialSource for RepositoryContext {
    fn connection_type(&self) -> ConnectionType {
        RepositoryContext::connection_type(self)
    }

    fn username(&self) -> String {
        RepositoryContext::username(self)
    }

    fn password(&self) -> String {
        RepositoryContext::password(self)
    }

    fn ssh_keys(&self) -> Vec<PathBuf> {
        self.ssh_key_candidates()
    }
}

impl std::fmt::Debug for RepositoryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryContext")
            .field("repo_path", &self.repo_path())
            .field("remote_name", &self.remote_name)
            .field("remote_url", &redact_url(&self.remote_url()))
            .field("connection_type", &self.connection_type())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

/// Relative form of `path` under `root`, accepting already-relative paths.
pub fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}
