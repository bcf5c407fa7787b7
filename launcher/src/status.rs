use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::Resolved;
use crate::grid::LauncherGrid;

/// Runtime status written to `status.toml` next to the config file.
/// Mirrors the checked state the launcher grid and tray menu would show.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LauncherStatus {
    /// Launcher binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub main_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_icon: Option<String>,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
    #[serde(default)]
    pub launchers: Vec<LauncherEntryStatus>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LauncherEntryStatus {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub running: bool,
}

impl LauncherStatus {
    /// Captures the current state of `grid`, built from `resolved`.
    pub fn capture(resolved: &Resolved, grid: &LauncherGrid) -> Self {
        let checked = grid.checked();
        let launchers = grid
            .iter()
            .zip(checked)
            .map(|(controller, running)| LauncherEntryStatus {
                label: controller.spec().label.clone(),
                icon: controller.spec().icon.as_ref().map(ToString::to_string),
                running,
            })
            .collect();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            main_label: resolved.main_label.clone(),
            main_icon: resolved.main_icon.as_ref().map(ToString::to_string),
            updated_at: chrono::Local::now().to_rfc3339(),
            launchers,
        }
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged, never fatal.
pub fn write_status(path: &Path, status: &LauncherStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::warn!("[status] Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                log::warn!("[status] Failed to write status file: {e}");
            }
        }
        Err(e) => log::warn!("[status] Failed to serialize status: {e}"),
    }
}
