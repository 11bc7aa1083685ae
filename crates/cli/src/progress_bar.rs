//! Terminal progress sink backed by `indicatif`.

use indicatif::{ProgressBar, ProgressStyle};

use gitsync_core::progress::ProgressSink;

const BAR_LENGTH: u64 = 1000;

/// Renders determinate progress as a bar and pulses as spinner ticks.
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_LENGTH);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
                .progress_chars("=> "),
        );
        Self { bar }
    }

    /// A sink that draws nothing, for `--quiet` and JSON output.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressSink for BarSink {
    fn set_current_progress(&self, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        self.bar.set_position((clamped * BAR_LENGTH as f64) as u64);
    }

    fn report(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn pulse(&self, message: &str) {
        self.bar.set_message(message.to_string());
        self.bar.tick();
    }

    fn hide(&self) {
        self.bar.finish_and_clear();
    }
}
