//! Secret storage contract for remote passwords.
//!
//! Secrets are keyed by `(remote, username)`. The repository context consults
//! its store at most once per lifetime and caches the answer.
//!
//! Implementations must never log or include secret values in error messages.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::errors::SecretError;

/// Trait for secret storage providers.
pub trait SecretStore: Send + Sync {
    /// Look up the secret for `username` on `remote`.
    ///
    /// Returns `Ok(None)` when nothing is stored.
    fn get_secret(&self, remote: &str, username: &str) -> Result<Option<String>, SecretError>;

    /// Store (or overwrite) the secret for `username` on `remote`.
    fn set_secret(&self, remote: &str, username: &str, secret: &str) -> Result<(), SecretError>;
}

/// Resolves the password from an environment variable named in config.
///
/// The variable is read on every lookup; the context's cache keeps that to a
/// single read in practice.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    password_env: Option<String>,
}

impl EnvSecretStore {
    pub fn new(password_env: Option<String>) -> Self {
        Self { password_env }
    }
}

impl SecretStore for EnvSecretStore {
    fn get_secret(&self, _remote: &str, _username: &str) -> Result<Option<String>, SecretError> {
        let Some(var) = self.password_env.as_deref() else {
            return Ok(None);
        };
        match std::env::var(var) {
            Ok(val) if !val.is_empty() => {
                debug!(env_name = var, "resolved password from environment");
                Ok(Some(val))
            }
            Ok(_) => {
                warn!(env_name = var, "password env var is set but empty");
                Ok(None)
            }
            Err(std::env::VarError::NotPresent) => {
                warn!(env_name = var, "password env var not set");
                Ok(None)
            }
            Err(e) => Err(SecretError::ReadError(format!("{var}: {e}"))),
        }
    }

    fn set_secret(&self, _remote: &str, _username: &str, _secret: &str) -> Result<(), SecretError> {
        Err(SecretError::WriteError(
            "environment-backed secrets are read-only".into(),
        ))
    }
}

/// In-process secret map.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<(String, String), String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get_secret(&self, remote: &str, username: &str) -> Result<Option<String>, SecretError> {
        let secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(secrets
            .get(&(remote.to_string(), username.to_string()))
            .cloned())
    }

    fn set_secret(&self, remote: &str, username: &str, secret: &str) -> Result<(), SecretError> {
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        secrets.insert(
            (remote.to_string(), username.to_string()),
            secret.to_string(),
        );
        Ok(())
    }
}
