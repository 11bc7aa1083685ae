//! Read-only repository configuration lookups.

use super::HandlerCore;
use crate::backend::GitBackend;
use crate::context::RepositoryContext;
use crate::models::Identity;

pub struct ConfigHandler {
    pub(super) core: HandlerCore,
}

impl ConfigHandler {
    pub fn new(core: HandlerCore) -> Self {
        Self { core }
    }

    pub fn get_string(&mut self, key: &str) -> Option<String> {
        match self.core.backend.config_string(&self.core.ctx, key) {
            Ok(value) => value,
            Err(e) => {
                self.core.errors.push_error(&format!("config {key}"), &e);
                None
            }
        }
    }

    pub fn get_bool(&mut self, key: &str) -> Option<bool> {
        match self.core.backend.config_bool(&self.core.ctx, key) {
            Ok(value) => value,
            Err(e) => {
                self.core.errors.push_error(&format!("config {key}"), &e);
                None
            }
        }
    }

    /// `user.name` / `user.email`, when both are set.
    pub fn user_identity(&mut self) -> Option<Identity> {
        repository_identity(self.core.backend.as_ref(), &self.core.ctx)
    }
}

/// Identity from repository config, `None` unless both keys are set and
/// non-empty.
pub(crate) fn repository_identity(backend: &dyn GitBackend, ctx: &RepositoryContext) -> Option<Identity> {
    let name = backend.config_string(ctx, "user.name").ok().flatten()?;
    let email = backend.config_string(ctx, "user.email").ok().flatten()?;
    if name.trim().is_empty() || email.trim().is_empty() {
        return None;
    }
    Some(Identity::new(name, email))
}
