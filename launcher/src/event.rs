use crate::config::Config;
use crate::input::UserCommand;

/// Identifies one spawned child. Unique for the lifetime of the launcher, so
/// events from a child of a discarded grid can never be mistaken for a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(pub u64);

/// Reported by a child's supervisor task back to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvent {
    /// Index of the owning launcher in its grid.
    pub launcher: usize,
    pub run: RunId,
    pub kind: ProcessEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEventKind {
    /// The child is executing.
    Started,
    /// The child has exited. `code` is `None` when it was killed by a signal.
    Exited { code: Option<i32> },
}

pub enum LauncherEvent {
    /// A line command was entered on stdin.
    Input(UserCommand),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received or `quit` entered; stop every child and exit.
    Shutdown,
}
