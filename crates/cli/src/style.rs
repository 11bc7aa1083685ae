//! Shared styling utilities for terminal output.

use console::Style;

use gitsync_core::models::FileStatusKind;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Colored label for a file status.
pub fn file_status(kind: FileStatusKind) -> String {
    let style = match kind {
        FileStatusKind::Modified | FileStatusKind::Added => Style::new().green(),
        FileStatusKind::Deleted | FileStatusKind::Conflicted => Style::new().red().bold(),
        FileStatusKind::Ahead => Style::new().cyan(),
        FileStatusKind::Behind => Style::new().magenta(),
        FileStatusKind::Untracked => Style::new().yellow(),
        FileStatusKind::Current | FileStatusKind::Ignored => Style::new().dim(),
    };
    style.apply_to(kind.to_string()).to_string()
}

/// Short form of a commit SHA.
pub fn short_sha(sha: &str) -> &str {
    &sha[..7.min(sha.len())]
}
