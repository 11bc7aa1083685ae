//! Caller-facing operation handlers.
//!
//! One handler per use case. Every handler wraps a [`HandlerCore`] bound to a
//! [`RepositoryContext`] and a [`GitBackend`], and exposes:
//!
//! - one primary method returning a closed result enum. Mutating operations
//!   return `Option<_>`, where `None` means another operation held the
//!   repository's single-flight slot and nothing was touched;
//! - an [`ErrorLog`] of human-readable diagnostics, popped oldest first.
//!
//! Handlers never return `Result`: engine errors are turned into result enum
//! members plus log entries at the handler boundary.

pub mod branch;
pub mod clone;
pub mod commit;
pub mod config;
pub mod fetch;
pub mod index;
pub mod init;
pub mod push;
pub mod remove_vcs;
pub mod revert;
pub mod status;

use std::sync::Arc;

use tracing::{debug, info_span, Span};
use uuid::Uuid;

use crate::backend::GitBackend;
use crate::context::RepositoryContext;
use crate::error_log::ErrorLog;
use crate::git::remote_url::redact_url;
use crate::progress::{NullSink, ProgressAdapter, ProgressSink};

pub use branch::BranchHandler;
pub use clone::CloneHandler;
pub use commit::CommitHandler;
pub use config::ConfigHandler;
pub use fetch::FetchHandler;
pub use index::IndexHandler;
pub use init::InitHandler;
pub use push::PushHandler;
pub use remove_vcs::RemoveVcsHandler;
pub use revert::RevertHandler;
pub use status::StatusHandler;

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

/// State every handler carries.
pub struct HandlerCore {
    ctx: Arc<RepositoryContext>,
    backend: Arc<dyn GitBackend>,
    sink: Arc<dyn ProgressSink>,
    errors: ErrorLog,
}

impl HandlerCore {
    pub fn new(ctx: Arc<RepositoryContext>, backend: Arc<dyn GitBackend>) -> Self {
        Self {
            ctx,
            backend,
            sink: Arc::new(NullSink),
            errors: ErrorLog::new(),
        }
    }

    /// Route progress of network operations to `sink`.
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn context(&self) -> &Arc<RepositoryContext> {
        &self.ctx
    }

    pub fn backend(&self) -> &Arc<dyn GitBackend> {
        &self.backend
    }

    /// Fresh adapter wired to the context's cancel flag.
    pub(crate) fn progress(&self) -> ProgressAdapter {
        ProgressAdapter::new(
            Arc::clone(&self.sink),
            self.ctx.cancel_flag(),
            self.ctx.sync_settings().progress_interval(),
        )
    }

    /// Span carrying a per-invocation operation id.
    pub(crate) fn span(&self, operation: &'static str) -> Span {
        info_span!("op", operation, op_id = %Uuid::new_v4())
    }

    /// Re-derive remote URL and connection type from the branch's tracking
    /// remote. Failures leave the current remote info untouched.
    pub(crate) fn refresh_remote_info(&self) {
        match self.backend.tracking_remote_url(&self.ctx) {
            Ok(Some(url)) => self.ctx.set_remote_url(&url),
            Ok(None) => debug!("no tracking remote; keeping remote info"),
            Err(e) => debug!(error = %e, "could not read tracking remote"),
        }
        debug!(
            url = %redact_url(&self.ctx.remote_url()),
            connection = %self.ctx.connection_type(),
            "remote info refreshed"
        );
    }
}

/// Error side channel shared by all handlers.
pub trait OperationHandler {
    fn core(&self) -> &HandlerCore;
    fn core_mut(&mut self) -> &mut HandlerCore;

    /// Accumulated diagnostics, oldest first.
    fn errors(&self) -> &ErrorLog {
        &self.core().errors
    }

    /// Remove and return the oldest diagnostic.
    fn pop_error(&mut self) -> Option<String> {
        self.core_mut().errors.pop()
    }

    fn drain_errors(&mut self) -> Vec<String> {
        self.core_mut().errors.drain()
    }
}

macro_rules! impl_operation_handler {
    ($($handler:ty),+ $(,)?) => {
        $(
            impl $crate::handlers::OperationHandler for $handler {
                fn core(&self) -> &$crate::handlers::HandlerCore {
                    &self.core
                }

                fn core_mut(&mut self) -> &mut $crate::handlers::HandlerCore {
                    &mut self.core
                }
            }
        )+
    };
}

impl_operation_handler!(
    BranchHandler,
    CloneHandler,
    CommitHandler,
    ConfigHandler,
    FetchHandler,
    IndexHandler,
    InitHandler,
    PushHandler,
    RemoveVcsHandler,
    RevertHandler,
    StatusHandler,
);
