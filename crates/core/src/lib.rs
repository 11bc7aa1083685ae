//! gitsync core library.
//!
//! This crate reconciles a local repository with its remote: it negotiates
//! credentials across several mechanisms, runs the fetch / fast-forward /
//! merge / rebase decision procedure, and allows one mutating repository
//! operation at a time per [`RepositoryContext`], with cooperative
//! cancellation. Callers drive it through the handlers in [`handlers`].

pub mod backend;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error_log;
pub mod errors;
pub mod git;
pub mod handlers;
pub mod models;
pub mod progress;
pub mod secrets;
pub mod sync_engine;

#[cfg(test)]
mod testing;

// Re-exports for convenience.
pub use backend::GitBackend;
pub use config::AppConfig;
pub use context::{CancelFlag, OperationGuard, RepositoryContext};
pub use error_log::ErrorLog;
pub use git::Git2Backend;
pub use handlers::{HandlerCore, OperationHandler};
pub use progress::{ProgressAdapter, ProgressSink};
pub use sync_engine::SyncEngine;
