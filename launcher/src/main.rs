mod config;
mod controller;
mod env;
mod event;
mod grid;
mod input;
mod paths;
mod relay;
mod sink;
mod spec;
mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use crate::config::Resolved;
use crate::controller::{ProcessController, ProcessState};
use crate::env::Environment;
use crate::event::LauncherEvent;
use crate::grid::LauncherGrid;
use crate::input::UserCommand;
use crate::sink::{ConsoleSink, LogSink};

/// Starts and stops the commands listed in a launcher config, relaying their
/// output to this terminal.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (default: <prefix>/share/applauncher/launcher-conf.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Status file (default: status.toml next to the config file).
    #[arg(long)]
    status: Option<PathBuf>,
    /// Seconds a stopped command gets to exit before it is killed.
    #[arg(long)]
    grace_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // ── Environment ───────────────────────────────────────────────────────────
    let mut base_env = Environment::from_system();
    let layout = match paths::Layout::detect(&base_env) {
        Ok(layout) => layout,
        Err(e) => {
            log::error!("{e:#}");
            std::process::exit(1);
        }
    };
    layout.apply_builtins(&mut base_env);

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = cli.config.clone().unwrap_or_else(|| layout.config_file());
    let status_path = cli
        .status
        .clone()
        .unwrap_or_else(|| paths::status_file_for(&config_path));
    let initial_config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        log::error!("[config] Error (using built-in launchers): {e:#}");
        config::builtin()
    });
    let override_grace = cli.grace_secs.map(Duration::from_secs);
    let resolve = |config: &config::Config| {
        let mut resolved = config.resolve(&base_env);
        if let Some(grace) = override_grace {
            resolved.stop_grace = grace;
        }
        resolved
    };

    let sink: Arc<dyn LogSink> = Arc::new(ConsoleSink);
    let mut resolved = resolve(&initial_config);
    let mut grid = build_grid(&resolved, &sink);
    status::write_status(&status_path, &status::LauncherStatus::capture(&resolved, &grid));

    let (event_tx, mut event_rx) = mpsc::channel::<LauncherEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path.clone(), event_tx.clone()));
    input::spawn_listener(event_tx.clone());

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(LauncherEvent::Shutdown).await;
            }
        });
    }

    log::info!(
        "{} v{} started with {} launcher(s) from {}",
        resolved.main_label,
        env!("CARGO_PKG_VERSION"),
        grid.len(),
        config_path.display()
    );
    print_launchers(&grid);
    println!("{}", input::USAGE);

    // ── Event loop ────────────────────────────────────────────────────────────
    loop {
        let checked_before = grid.checked();

        tokio::select! {
            Some(process_event) = grid.next_event() => {
                grid.handle_event(process_event);
            }
            evt = event_rx.recv() => {
                let Some(evt) = evt else { break };
                match evt {
                    LauncherEvent::Input(command) => {
                        if !apply_command(&mut grid, command) {
                            break;
                        }
                    }

                    LauncherEvent::ConfigReloaded(new_config) => {
                        log::info!("[config] Config reloaded; rebuilding launchers");
                        grid.shutdown().await;
                        resolved = resolve(&new_config);
                        grid = build_grid(&resolved, &sink);
                        status::write_status(
                            &status_path,
                            &status::LauncherStatus::capture(&resolved, &grid),
                        );
                        print_launchers(&grid);
                        continue;
                    }

                    LauncherEvent::Shutdown => break,
                }
            }
        }

        if grid.checked() != checked_before {
            status::write_status(
                &status_path,
                &status::LauncherStatus::capture(&resolved, &grid),
            );
        }
    }

    log::info!("Shutting down");
    grid.shutdown().await;
    status::write_status(
        &status_path,
        &status::LauncherStatus::capture(&resolved, &grid),
    );
}

fn build_grid(resolved: &Resolved, sink: &Arc<dyn LogSink>) -> LauncherGrid {
    LauncherGrid::new(resolved.launchers.clone(), Arc::clone(sink), resolved.stop_grace)
}

/// Runs one stdin command. Returns `false` when the launcher should exit.
fn apply_command(grid: &mut LauncherGrid, command: UserCommand) -> bool {
    let found = match command {
        UserCommand::List => {
            print_launchers(grid);
            true
        }
        UserCommand::Toggle(i) => grid.toggle(i),
        UserCommand::Start(i) => grid.start(i),
        UserCommand::Stop(i) => grid.stop(i),
        UserCommand::Quit => return false,
    };
    if !found {
        println!("no such launcher; {} configured", grid.len());
    }
    true
}

/// One row of the `list` output: checked mark, label and pid of a live child.
fn launcher_line(controller: &ProcessController) -> String {
    let mark = match controller.state() {
        ProcessState::Running => "[x]",
        ProcessState::Starting => "[~]",
        ProcessState::Stopped => "[ ]",
    };
    match controller.pid() {
        Some(pid) => format!("{mark} {} (pid {pid})", controller.spec().label),
        None => format!("{mark} {}", controller.spec().label),
    }
}

fn print_launchers(grid: &LauncherGrid) {
    if grid.is_empty() {
        println!("no launchers configured");
        return;
    }
    for (i, controller) in grid.iter().enumerate() {
        println!("{:>3} {}", i + 1, launcher_line(controller));
    }
}
