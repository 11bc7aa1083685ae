//! Repository initialization and remote setup.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::HandlerCore;
use crate::git::remote_url::{derive_connection_type, redact_url};
use crate::models::{InitResult, RemoteConfig};

pub struct InitHandler {
    pub(super) core: HandlerCore,
}

impl InitHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self { core }
    }

    /// Create an empty repository at `path` and install it in the context.
    ///
    /// An existing repository is left alone and reported as
    /// [`InitResult::AlreadyExists`].
    pub fn init_repository(&mut self, path: impl AsRef<Path>) -> Option<InitResult> {
        let path = path.as_ref();
        let _span = self.core.span("init").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        if self.core.backend.is_repository(path) {
            info!(path = %path.display(), "repository already exists");
            ctx.set_repo_path(path);
            return Some(InitResult::AlreadyExists);
        }

        match self.core.backend.init_repository(path) {
            Ok(()) => {
                ctx.set_repo_path(path);
                Some(InitResult::Success)
            }
            Err(e) => {
                self.core.errors.push_error("init", &e);
                Some(InitResult::Error)
            }
        }
    }

    /// Add the conventional remote and adopt its credentials in the context.
    ///
    /// The connection type is always derived from `remote.url`.
    pub fn setup_remote(&mut self, mut remote: RemoteConfig) -> Option<InitResult> {
        let _span = self.core.span("setup_remote").entered();
        let ctx = Arc::clone(&self.core.ctx);
        let _guard = ctx.try_acquire()?;

        if remote.url.trim().is_empty() {
            self.core.errors.push("setup remote: empty remote URL");
            return Some(InitResult::Error);
        }
        remote.connection_type = derive_connection_type(&remote.url);

        ctx.set_username(&remote.username);
        if !remote.password.is_empty() {
            ctx.set_password(&remote.password);
        }
        if remote.ssh_key.is_some() {
            ctx.set_preferred_ssh_key(remote.ssh_key.clone());
        }
        ctx.set_remote_url(&remote.url);

        match self.core.backend.setup_remote(&ctx, &remote) {
            Ok(()) => {
                self.core.refresh_remote_info();
                info!(
                    url = %redact_url(&remote.url),
                    connection = %remote.connection_type,
                    "remote configured"
                );
                Some(InitResult::Success)
            }
            Err(e) => {
                self.core.errors.push_error("setup remote", &e);
                Some(InitResult::Error)
            }
        }
    }
}
