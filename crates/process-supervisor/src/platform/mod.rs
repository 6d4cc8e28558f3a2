//! Cross-platform process-group spawn/signal/kill. Call sites never see `cfg(unix)`/`cfg(windows)` directly;
//! they go through [`prepare_group_leader`] and [`terminate_group`].

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::{prepare_group_leader, terminate_group};
#[cfg(windows)]
pub use windows::{prepare_group_leader, terminate_group};

/// How hard to hit the process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateMode {
    /// SIGTERM (POSIX) / generate-console-ctrl-event then taskkill (Windows).
    Graceful,
    /// SIGKILL (POSIX) / `taskkill /F /T` (Windows).
    Force,
}
