/// Lifecycle of one launcher's child process.
///
/// A [`ProcessController`] lives on the event loop. `start`/`stop`/`toggle`
/// return immediately; the OS-side waiting happens in a supervisor task per
/// child, which reports [`ProcessEvent`]s back over a channel. The loop hands
/// each event to [`ProcessController::handle_event`], which performs the state
/// transition and notifies observers synchronously.
///
/// ```text
///            start()             Started
///  Stopped ──────────► Starting ─────────► Running
///     ▲                   │                   │
///     └───── Exited ──────┴────── Exited ─────┘
/// ```
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::event::{ProcessEvent, ProcessEventKind, RunId};
use crate::relay;
use crate::sink::{LogSink, StreamKind};
use crate::spec::LauncherSpec;

/// How long a child gets to exit after the termination request before it is
/// killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the relays to drain after the child has exited.
/// A grandchild holding the pipes open must not keep the launcher "running".
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
}

type Observer = Box<dyn FnMut(bool) + Send>;

/// The child currently owned by a controller.
struct LiveChild {
    run: RunId,
    pid: Option<u32>,
    /// Taken on the first `stop()`. Dropping it (with the controller) also
    /// terminates the child.
    terminate_tx: Option<oneshot::Sender<()>>,
}

pub struct ProcessController {
    index: usize,
    spec: LauncherSpec,
    sink: Arc<dyn LogSink>,
    events: mpsc::Sender<ProcessEvent>,
    stop_grace: Duration,
    state: ProcessState,
    /// `Some` exactly when `state != Stopped`.
    child: Option<LiveChild>,
    observers: Vec<Observer>,
}

impl ProcessController {
    /// `index` tags every event this controller's children emit on `events`.
    pub fn new(
        index: usize,
        spec: LauncherSpec,
        sink: Arc<dyn LogSink>,
        events: mpsc::Sender<ProcessEvent>,
        stop_grace: Duration,
    ) -> Self {
        Self {
            index,
            spec,
            sink,
            events,
            stop_grace,
            state: ProcessState::Stopped,
            child: None,
            observers: Vec::new(),
        }
    }

    pub fn spec(&self) -> &LauncherSpec {
        &self.spec
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    /// OS process id of the live child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.pid)
    }

    /// Registers `observer` to be called with the new "is running" value each
    /// time the state changes to or from [`ProcessState::Running`].
    pub fn subscribe(&mut self, observer: impl FnMut(bool) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Starts the child if stopped; otherwise asks it to stop.
    pub fn toggle(&mut self) {
        match self.state {
            ProcessState::Stopped => self.start(),
            ProcessState::Starting | ProcessState::Running => self.stop(),
        }
    }

    /// Spawns the child. Ignored unless the controller is stopped.
    ///
    /// An empty or malformed command is a no-op. A spawn failure is written to
    /// the log sink as stderr and leaves the controller stopped.
    pub fn start(&mut self) {
        if self.state != ProcessState::Stopped {
            log::debug!(
                "[launcher] '{}' is {:?}; start ignored",
                self.spec.label,
                self.state
            );
            return;
        }
        let Some(command_line) = self.spec.command_line() else {
            log::warn!(
                "[launcher] '{}': command {:?} is empty or malformed",
                self.spec.label,
                self.spec.command
            );
            return;
        };

        self.state = ProcessState::Starting;

        let mut command = Command::new(&command_line.program);
        command
            .args(&command_line.args)
            .env_clear()
            .envs(self.spec.environment.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.spec.working_directory() {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::warn!("[launcher] Failed to start '{}': {e}", self.spec.label);
                self.sink.append(
                    &format!("failed to start {}: {e}\n", self.spec.label),
                    StreamKind::Stderr,
                );
                self.state = ProcessState::Stopped;
                return;
            }
        };

        let run = RunId(NEXT_RUN.fetch_add(1, Ordering::Relaxed));
        let pid = child.id();
        log::info!(
            "[launcher] Started '{}' (pid {})",
            self.spec.label,
            pid.map_or_else(|| "?".to_string(), |p| p.to_string())
        );

        let mut relays = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            relays.push(tokio::spawn(relay::run(
                stdout,
                StreamKind::Stdout,
                Arc::clone(&self.sink),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            relays.push(tokio::spawn(relay::run(
                stderr,
                StreamKind::Stderr,
                Arc::clone(&self.sink),
            )));
        }

        let (terminate_tx, terminate_rx) = oneshot::channel();
        tokio::spawn(supervise(
            child,
            relays,
            terminate_rx,
            self.stop_grace,
            self.index,
            run,
            self.events.clone(),
        ));

        self.child = Some(LiveChild {
            run,
            pid,
            terminate_tx: Some(terminate_tx),
        });
    }

    /// Requests termination of the live child. The controller becomes
    /// [`ProcessState::Stopped`] only once the exit is reported.
    pub fn stop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.terminate_tx.take() {
            Some(tx) => {
                log::info!("[launcher] Stopping '{}'", self.spec.label);
                let _ = tx.send(());
            }
            None => log::debug!("[launcher] '{}' is already stopping", self.spec.label),
        }
    }

    /// Applies an event reported by this controller's supervisor. Events for
    /// any other run are ignored.
    pub fn handle_event(&mut self, event: &ProcessEvent) {
        let Some(child) = self.child.as_ref() else {
            return;
        };
        if child.run != event.run {
            log::debug!("[launcher] '{}': stale event {event:?}", self.spec.label);
            return;
        }
        match event.kind {
            ProcessEventKind::Started => {
                // A stop requested while starting wins; wait for the exit.
                if self.state == ProcessState::Starting && child.terminate_tx.is_some() {
                    self.set_state(ProcessState::Running);
                }
            }
            ProcessEventKind::Exited { code } => {
                match code {
                    Some(code) => log::info!("[launcher] '{}' exited ({code})", self.spec.label),
                    None => log::info!("[launcher] '{}' terminated", self.spec.label),
                }
                self.child = None;
                self.set_state(ProcessState::Stopped);
            }
        }
    }

    fn set_state(&mut self, state: ProcessState) {
        let was_running = self.is_running();
        self.state = state;
        let running = self.is_running();
        if was_running != running {
            for observer in &mut self.observers {
                observer(running);
            }
        }
    }
}

/// Owns the child for its whole life: reports `Started`, waits for exit or a
/// termination request, drains the relays, then reports `Exited`.
async fn supervise(
    mut child: Child,
    relays: Vec<JoinHandle<()>>,
    mut terminate_rx: oneshot::Receiver<()>,
    stop_grace: Duration,
    launcher: usize,
    run: RunId,
    events: mpsc::Sender<ProcessEvent>,
) {
    let _ = events
        .send(ProcessEvent {
            launcher,
            run,
            kind: ProcessEventKind::Started,
        })
        .await;

    // Resolves on `stop()` and also when the controller is dropped.
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = &mut terminate_rx => None,
    };
    let status = match exited {
        Some(status) => status,
        None => terminate(&mut child, stop_grace).await,
    };
    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            log::warn!("[launcher] Failed to wait for child: {e}");
            None
        }
    };

    let deadline = tokio::time::Instant::now() + RELAY_DRAIN_TIMEOUT;
    for relay in relays {
        let _ = tokio::time::timeout_at(deadline, relay).await;
    }

    let _ = events
        .send(ProcessEvent {
            launcher,
            run,
            kind: ProcessEventKind::Exited { code },
        })
        .await;
}

/// Asks the child to exit and kills it if it is still alive after `grace`.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    request_exit(child);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            log::warn!("[launcher] Child did not exit within {grace:?}; killing");
            let _ = child.start_kill();
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // `None` means the child has already been reaped.
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            log::debug!("[launcher] SIGTERM to {pid} failed: {e}");
        }
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    // No graceful request exists for arbitrary Windows processes.
    let _ = child.start_kill();
}
