//! Progress reporting.
//!
//! Engine callbacks arrive far too often to forward one-for-one. A
//! [`TransferThrottle`] thins them to at most one per interval (always letting
//! the final callback of a phase through), and the [`ProgressAdapter`] turns
//! what remains into percentage-or-pulse updates on a [`ProgressSink`].
//!
//! Every adapter call also checks the cancellation flag and reports whether
//! the transfer should continue, so transports can abort promptly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::context::CancelFlag;

/// UI-agnostic consumer of progress updates.
pub trait ProgressSink: Send + Sync {
    /// Determinate progress as a fraction in `0.0..=1.0`.
    fn set_current_progress(&self, fraction: f64);
    /// Status line accompanying the current progress.
    fn report(&self, message: &str);
    /// Indeterminate activity.
    fn pulse(&self, message: &str);
    /// The operation is over; remove any progress display.
    fn hide(&self);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn set_current_progress(&self, _fraction: f64) {}
    fn report(&self, _message: &str) {}
    fn pulse(&self, _message: &str) {}
    fn hide(&self) {}
}

/// Logs progress at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn set_current_progress(&self, fraction: f64) {
        debug!(percent = format!("{:.1}", fraction * 100.0), "progress");
    }

    fn report(&self, message: &str) {
        debug!(message, "progress");
    }

    fn pulse(&self, message: &str) {
        debug!(message, "working");
    }

    fn hide(&self) {}
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

const NO_PREVIOUS: u64 = u64::MAX;

/// Converts raw `(current, total)` counters into sink updates.
pub struct ProgressAdapter {
    sink: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
    previous: AtomicU64,
    throttle: TransferThrottle,
}

impl ProgressAdapter {
    pub fn new(sink: Arc<dyn ProgressSink>, cancel: CancelFlag, interval: Duration) -> Self {
        Self {
            sink,
            cancel,
            previous: AtomicU64::new(NO_PREVIOUS),
            throttle: TransferThrottle::new(interval),
        }
    }

    /// Adapter with no sink, for callers that only need cancellation checks.
    pub fn silent(cancel: CancelFlag) -> Self {
        Self::new(Arc::new(NullSink), cancel, Duration::ZERO)
    }

    /// Forward one progress sample.
    ///
    /// Pulses when `total` is zero or `current` repeats the previous sample,
    /// otherwise sets `current / total`. The sample is remembered either way.
    /// Returns `false` once cancellation has been requested.
    pub fn report(&self, current: u64, total: u64, message: &str) -> bool {
        let previous = self.previous.swap(current, Ordering::SeqCst);
        if total == 0 || current == previous {
            self.sink.pulse(message);
        } else {
            self.sink.set_current_progress(current as f64 / total as f64);
            self.sink.report(message);
        }
        self.should_continue()
    }

    /// Throttled variant of [`report`](Self::report) for engine transfer
    /// callbacks. Samples with `current == total` always get through.
    pub fn transfer(&self, current: u64, total: u64, message: &str) -> bool {
        let is_final = total > 0 && current >= total;
        if self.throttle.should_forward(is_final) {
            self.report(current, total, message)
        } else {
            self.should_continue()
        }
    }

    /// Indeterminate activity; also a cancellation checkpoint.
    pub fn pulse(&self, message: &str) -> bool {
        self.sink.pulse(message);
        self.should_continue()
    }

    /// Status line without changing the fraction.
    pub fn message(&self, message: &str) {
        self.sink.report(message);
    }

    pub fn hide(&self) {
        self.sink.hide();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn should_continue(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for ProgressAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAdapter")
            .field("previous", &self.previous.load(Ordering::Relaxed))
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// Rate limiter for progress forwarding.
#[derive(Debug)]
pub struct TransferThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl TransferThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Whether a sample should be forwarded now. `force` bypasses the limit.
    pub fn should_forward(&self, force: bool) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let due = match *last {
            None => true,
            Some(at) => now.duration_since(at) >= self.interval,
        };
        if due || force {
            *last = Some(now);
            true
        } else {
            false
        }
    }
}
