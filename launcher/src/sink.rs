use std::io::Write;

/// Which child stream a chunk of output came from. Only used for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Append-only destination for process output, shared by every launcher.
///
/// Implementations must make each `append` atomic: text from one call is never
/// interleaved with text from another.
pub trait LogSink: Send + Sync {
    fn append(&self, text: &str, kind: StreamKind);
}

/// Writes stdout chunks to the launcher's own stdout and stderr chunks to its
/// stderr, holding the stream lock for the duration of each append.
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn append(&self, text: &str, kind: StreamKind) {
        // Write errors (closed terminal, broken pipe) are not ours to handle.
        match kind {
            StreamKind::Stdout => {
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            StreamKind::Stderr => {
                let mut err = std::io::stderr().lock();
                let _ = err.write_all(text.as_bytes());
                let _ = err.flush();
            }
        }
    }
}
