/// The set of launchers built from one config.
///
/// The grid owns every [`ProcessController`] and the receiving end of their
/// event channel. It routes [`ProcessEvent`]s back to the controller they
/// belong to and keeps a checked-state table (one flag per launcher) that
/// observers update on every running/stopped change.
///
/// Dropping the grid drops its controllers, which terminates any live child.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::controller::{ProcessController, ProcessState};
use crate::event::ProcessEvent;
use crate::sink::LogSink;
use crate::spec::LauncherSpec;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Extra time on top of the stop grace period for children to be reaped.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

pub struct LauncherGrid {
    controllers: Vec<ProcessController>,
    checked: Arc<Mutex<Vec<bool>>>,
    events_rx: mpsc::Receiver<ProcessEvent>,
    stop_grace: Duration,
}

impl LauncherGrid {
    pub fn new(specs: Vec<LauncherSpec>, sink: Arc<dyn LogSink>, stop_grace: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let checked = Arc::new(Mutex::new(vec![false; specs.len()]));

        let controllers = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                let label = spec.label.clone();
                let mut controller = ProcessController::new(
                    index,
                    spec,
                    Arc::clone(&sink),
                    events_tx.clone(),
                    stop_grace,
                );
                let table = Arc::clone(&checked);
                controller.subscribe(move |running| {
                    if let Ok(mut table) = table.lock() {
                        if let Some(slot) = table.get_mut(index) {
                            *slot = running;
                        }
                    }
                });
                controller.subscribe(move |running| {
                    let state = if running { "running" } else { "stopped" };
                    log::info!("[launcher] '{label}' is {state}");
                });
                controller
            })
            .collect();

        Self {
            controllers,
            checked,
            events_rx,
            stop_grace,
        }
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessController> {
        self.controllers.iter()
    }

    /// Snapshot of the checked state of each launcher, in order.
    pub fn checked(&self) -> Vec<bool> {
        self.checked
            .lock()
            .map(|t| t.clone())
            .unwrap_or_else(|_| vec![false; self.controllers.len()])
    }

    /// Toggles launcher `index`. Returns `false` if there is no such launcher.
    pub fn toggle(&mut self, index: usize) -> bool {
        self.with_controller(index, ProcessController::toggle)
    }

    pub fn start(&mut self, index: usize) -> bool {
        self.with_controller(index, ProcessController::start)
    }

    pub fn stop(&mut self, index: usize) -> bool {
        self.with_controller(index, ProcessController::stop)
    }

    fn with_controller(&mut self, index: usize, f: impl FnOnce(&mut ProcessController)) -> bool {
        match self.controllers.get_mut(index) {
            Some(controller) => {
                f(controller);
                true
            }
            None => false,
        }
    }

    /// Waits for the next event from any child of this grid.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events_rx.recv().await
    }

    pub fn handle_event(&mut self, event: ProcessEvent) {
        match self.controllers.get_mut(event.launcher) {
            Some(controller) => controller.handle_event(&event),
            None => log::debug!("[launcher] Event for unknown launcher {}", event.launcher),
        }
    }

    pub fn any_live(&self) -> bool {
        self.controllers
            .iter()
            .any(|c| c.state() != ProcessState::Stopped)
    }

    /// Stops every live child and waits for their exits, bounded by the stop
    /// grace period plus a little slack.
    pub async fn shutdown(&mut self) {
        for controller in &mut self.controllers {
            controller.stop();
        }
        let deadline = tokio::time::Instant::now() + self.stop_grace + SHUTDOWN_SLACK;
        while self.any_live() {
            match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) => break,
                Err(_) => {
                    log::warn!("[launcher] Children still running at shutdown deadline");
                    break;
                }
            }
        }
    }
}
