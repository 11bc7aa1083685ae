//! TOML-based configuration system for gitsync.
//!
//! Sensitive values (remote passwords) are stored as `_env` fields that
//! reference environment variable names. The actual secret is resolved lazily
//! through an [`EnvSecretStore`](crate::secrets::EnvSecretStore) the first
//! time a transport asks for it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::models::Identity;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local repository location.
    pub repository: RepositoryConfig,

    /// Remote endpoint and credentials.
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Pull / progress behaviour.
    #[serde(default)]
    pub sync: SyncConfig,

    /// SSH key discovery.
    #[serde(default)]
    pub ssh: SshConfig,

    /// Fallback commit identity.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Log verbosity.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Local repository settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Working directory of the repository.
    pub path: PathBuf,

    /// Root used to build absolute paths in status results, when it differs
    /// from the working directory.
    #[serde(default)]
    pub project_dir: Option<PathBuf>,

    /// Conventional remote name used for fetch / push (default `origin`).
    #[serde(default = "default_remote_name")]
    pub remote_name: String,
}

fn default_remote_name() -> String {
    "origin".into()
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Remote endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Remote URL. When empty, the URL configured in the repository is used.
    #[serde(default)]
    pub url: String,

    /// Username offered to the transport.
    #[serde(default)]
    pub username: String,

    /// Environment variable holding the remote password / token.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Preferred SSH private key, tried before any discovered key.
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Pull and progress behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Rebase instead of merge when git config `pull.rebase` is unset.
    #[serde(default)]
    pub prefer_rebase: bool,

    /// Minimum spacing between forwarded transfer-progress updates.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
}

fn default_progress_interval() -> u64 {
    100
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefer_rebase: false,
            progress_interval_ms: default_progress_interval(),
        }
    }
}

impl SyncConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// SSH
// ---------------------------------------------------------------------------

/// Where to look for SSH keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshConfig {
    /// SSH client config file (default `~/.ssh/config`).
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    /// Directory holding default key files (default `~/.ssh`).
    #[serde(default)]
    pub key_dir: Option<PathBuf>,
}

impl SshConfig {
    /// Resolved config file path, `~` expanded.
    pub fn config_file_path(&self) -> Option<PathBuf> {
        match &self.config_file {
            Some(p) => Some(expand_tilde(p)),
            None => dirs::home_dir().map(|h| h.join(".ssh").join("config")),
        }
    }

    /// Resolved key directory, `~` expanded.
    pub fn key_dir_path(&self) -> Option<PathBuf> {
        match &self.key_dir {
            Some(p) => Some(expand_tilde(p)),
            None => dirs::home_dir().map(|h| h.join(".ssh")),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Commit identity used when the repository has no `user.name` / `user.email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_name")]
    pub name: String,

    #[serde(default = "default_identity_email")]
    pub email: String,
}

fn default_identity_name() -> String {
    "gitsync".into()
}
fn default_identity_email() -> String {
    "gitsync@localhost".into()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_identity_name(),
            email: default_identity_email(),
        }
    }
}

impl IdentityConfig {
    pub fn identity(&self) -> Identity {
        Identity::new(&self.name, &self.email)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log verbosity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Minimal in-memory config for a repository path.
    pub fn for_repository(path: impl Into<PathBuf>) -> Self {
        Self {
            repository: RepositoryConfig {
                path: path.into(),
                project_dir: None,
                remote_name: default_remote_name(),
            },
            remote: RemoteSettings::default(),
            sync: SyncConfig::default(),
            ssh: SshConfig::default(),
            identity: IdentityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.repository.path = expand_tilde(&config.repository.path);
        config.repository.project_dir = config.repository.project_dir.as_deref().map(expand_tilde);
        config.remote.ssh_key = config.remote.ssh_key.as_deref().map(expand_tilde);

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.path".into(),
                detail: "repository path must not be empty".into(),
            });
        }
        if self.repository.remote_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.remote_name".into(),
                detail: "remote name must not be empty".into(),
            });
        }
        if self.sync.progress_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.progress_interval_ms".into(),
                detail: "progress interval must be > 0".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if s == "~" {
        return dirs::home_dir().unwrap_or_else(|| path.to_path_buf());
    }
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
