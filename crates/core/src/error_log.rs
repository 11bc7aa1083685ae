//! Accumulated, human-readable error strings exposed by every handler.
//!
//! Ordering is FIFO: [`ErrorLog::pop`] returns the oldest message first, and
//! messages stay in the log until the caller pops or drains them.

use std::collections::VecDeque;
use std::fmt;

use tracing::warn;

/// FIFO list of diagnostic messages produced by an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLog {
    entries: VecDeque<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Every appended message is also logged at warn level.
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "operation error");
        self.entries.push_back(message);
    }

    /// Append `context: err`, the format used for wrapped engine errors.
    pub fn push_error(&mut self, context: &str, err: &dyn fmt::Display) {
        self.push(format!("{context}: {err}"));
    }

    /// Remove and return the oldest message.
    pub fn pop(&mut self) -> Option<String> {
        self.entries.pop_front()
    }

    /// Remove and return all messages, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        self.entries.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
