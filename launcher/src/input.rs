/// Line commands read from stdin.
///
/// stdin is read on a dedicated OS thread with blocking reads; each parsed
/// command is forwarded to the event loop. End of input stops the reader only.
use std::io::BufRead;
use tokio::sync::mpsc;

use crate::event::LauncherEvent;

pub const USAGE: &str = "commands: list | toggle N | start N | stop N | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    List,
    /// Launcher index, 0-based (the user types 1-based).
    Toggle(usize),
    Start(usize),
    Stop(usize),
    Quit,
}

impl UserCommand {
    /// Parses one input line. Returns `None` for blank or unrecognised input.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?.to_lowercase();
        let index = words.next().and_then(parse_index);
        if words.next().is_some() {
            return None;
        }
        match (verb.as_str(), index) {
            ("list" | "ls", None) => Some(Self::List),
            ("quit" | "q" | "exit", None) => Some(Self::Quit),
            ("toggle" | "t", Some(i)) => Some(Self::Toggle(i)),
            ("start", Some(i)) => Some(Self::Start(i)),
            ("stop", Some(i)) => Some(Self::Stop(i)),
            _ => None,
        }
    }
}

/// `"3"` → `Some(2)`; zero and non-numbers are rejected.
fn parse_index(word: &str) -> Option<usize> {
    word.parse::<usize>().ok()?.checked_sub(1)
}

/// Spawns the stdin reader thread.
pub fn spawn_listener(tx: mpsc::Sender<LauncherEvent>) {
    let spawned = std::thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match UserCommand::parse(&line) {
                    Some(command) => {
                        if tx.blocking_send(LauncherEvent::Input(command)).is_err() {
                            break;
                        }
                    }
                    None => println!("{USAGE}"),
                }
            }
            log::debug!("[input] stdin closed");
        });
    if let Err(e) = spawned {
        log::warn!("[input] Failed to spawn stdin reader: {e}");
    }
}
