//! SSH key discovery.
//!
//! Candidate keys come from `IdentityFile` entries in the SSH client config
//! whose `Host` pattern (or `Hostname`) matches the remote host, followed by
//! the conventional default key files in the key directory. Only files that
//! exist are returned, each at most once.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::{expand_tilde, SshConfig};

/// Default key file names, in the order they are tried.
pub const DEFAULT_KEY_NAMES: [&str; 4] = ["id_rsa", "id_dsa", "id_ecdsa", "id_ed25519"];

/// One `Host` block of an SSH client config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEntry {
    pub patterns: Vec<String>,
    pub hostname: Option<String>,
    pub identity_files: Vec<PathBuf>,
}

impl HostEntry {
    /// Whether this block applies to `host`.
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let mut matched = false;
        for pattern in &self.patterns {
            let pattern = pattern.to_ascii_lowercase();
            if let Some(negated) = pattern.strip_prefix('!') {
                if glob_match::glob_match(negated, &host) {
                    return false;
                }
            } else if glob_match::glob_match(&pattern, &host) {
                matched = true;
            }
        }
        matched
            || self
                .hostname
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(&host))
    }
}

/// Parse the `Host` / `Hostname` / `IdentityFile` directives of an SSH config.
///
/// Keywords are case-insensitive and may be separated from their value by
/// whitespace or `=`. Directives before the first `Host` line land in a
/// catch-all block matching every host.
pub fn parse_config(contents: &str) -> Vec<HostEntry> {
    let mut entries = Vec::new();
    let mut current = HostEntry {
        patterns: vec!["*".to_string()],
        ..HostEntry::default()
    };

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((keyword, value)) = split_directive(line) else {
            continue;
        };

        match keyword.to_ascii_lowercase().as_str() {
            "host" => {
                entries.push(std::mem::take(&mut current));
                current.patterns = value.split_whitespace().map(str::to_string).collect();
            }
            "hostname" => current.hostname = Some(unquote(value).to_string()),
            "identityfile" => current.identity_files.push(PathBuf::from(unquote(value))),
            _ => {}
        }
    }
    entries.push(current);
    entries.retain(|e| !e.identity_files.is_empty() || e.hostname.is_some());
    entries
}

fn split_directive(line: &str) -> Option<(&str, &str)> {
    let split = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (keyword, rest) = line.split_at(split);
    let value = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '=').trim();
    (!value.is_empty()).then_some((keyword, value))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Ordered, de-duplicated list of existing private-key files for `host`.
pub fn candidate_keys(host: Option<&str>, ssh: &SshConfig) -> Vec<PathBuf> {
    let mut keys: Vec<PathBuf> = Vec::new();

    if let (Some(host), Some(config_path)) = (host, ssh.config_file_path()) {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => {
                for entry in parse_config(&contents).iter().filter(|e| e.matches(host)) {
                    for file in &entry.identity_files {
                        push_existing(&mut keys, expand_tilde(file));
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %config_path.display(), "no ssh config file");
            }
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "failed to read ssh config");
            }
        }
    }

    if let Some(dir) = ssh.key_dir_path() {
        for name in DEFAULT_KEY_NAMES {
            push_existing(&mut keys, dir.join(name));
        }
    }

    keys
}

fn push_existing(keys: &mut Vec<PathBuf>, path: PathBuf) {
    if path.is_file() && !keys.contains(&path) {
        keys.push(path);
    }
}
