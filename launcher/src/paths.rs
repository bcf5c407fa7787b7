/// Install layout and the built-in variables derived from it.
///
/// A regular install keeps data under `<prefix>/share/applauncher/`, next to
/// `<prefix>/bin/applauncher`. An AppImage (detected by `APPDIR`) keeps it in
/// `applauncher/` beside the application file, which is then named by `ARGV0`.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::env::Environment;

const SHARE_DIR_NAME: &str = "applauncher";
const RESOURCE_DIR_NAME: &str = "resources";
pub const CONFIG_FILE_NAME: &str = "launcher-conf.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Where the launcher binary lives and where its data is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Path of the application file as the user sees it.
    pub app_file: PathBuf,
    /// Path of the running executable (differs from `app_file` in an AppImage).
    pub real_file: PathBuf,
    pub app_image: bool,
}

impl Layout {
    /// Detects the layout of the running executable from `env`.
    pub fn detect(env: &Environment) -> Result<Self> {
        let real_file =
            std::env::current_exe().context("Failed to locate launcher executable")?;
        Ok(Self::from_parts(real_file, env))
    }

    fn from_parts(real_file: PathBuf, env: &Environment) -> Self {
        let app_image = env.contains("APPDIR");
        let app_file = match env.get("ARGV0") {
            Some(argv0) if app_image && !argv0.is_empty() => PathBuf::from(argv0),
            _ => real_file.clone(),
        };
        Self {
            app_file,
            real_file,
            app_image,
        }
    }

    pub fn app_dir(&self) -> PathBuf {
        self.app_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn share_dir(&self) -> PathBuf {
        if self.app_image {
            self.app_dir().join(SHARE_DIR_NAME)
        } else {
            self.app_dir().join("..").join("share").join(SHARE_DIR_NAME)
        }
    }

    pub fn resource_dir(&self) -> PathBuf {
        self.share_dir().join(RESOURCE_DIR_NAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.share_dir().join(CONFIG_FILE_NAME)
    }

    /// Adds the `APPLICATION_*` variables (and `HOME`, if unset) to `env`.
    pub fn apply_builtins(&self, env: &mut Environment) {
        if !env.contains("HOME") {
            if let Some(home) = home_fallback(env) {
                env.set("HOME", home);
            }
        }
        env.set("APPLICATION_FILE_PATH", self.app_file.to_string_lossy());
        env.set("APPLICATION_DIR_PATH", self.app_dir().to_string_lossy());
        env.set("APPLICATION_RESOURCE_PATH", self.resource_dir().to_string_lossy());
        if self.app_image {
            let real_dir = self.real_file.parent().unwrap_or_else(|| Path::new("."));
            env.set("APPLICATION_REAL_FILE_PATH", real_dir.to_string_lossy());
        }
    }
}

/// `HOME` is normally set on Unix; on Windows fall back to the profile dir.
fn home_fallback(env: &Environment) -> Option<String> {
    env.get("USERPROFILE").map(str::to_string).or_else(|| {
        let drive = env.get("HOMEDRIVE")?;
        let path = env.get("HOMEPATH")?;
        Some(format!("{drive}{path}"))
    })
}

/// The status file lives next to the config file.
pub fn status_file_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|d| d.join(STATUS_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(STATUS_FILE_NAME))
}
