use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::controller::DEFAULT_STOP_GRACE;
use crate::env::Environment;
use crate::event::LauncherEvent;
use crate::spec::{IconRef, LauncherSpec};

pub const DEFAULT_MAIN_LABEL: &str = "App Launcher";

/// Root configuration structure, deserialized from `launcher-conf.toml`.
///
/// Every string field may reference variables as `${NAME}`; they are expanded
/// by [`Config::resolve`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Title of the launcher.
    #[serde(default)]
    pub main_label: Option<String>,
    #[serde(default)]
    pub main_icon: Option<String>,
    /// Directories prepended to `PATH`, in order.
    #[serde(default)]
    pub path: Vec<String>,
    /// Seconds a stopped child gets to exit before it is killed.
    #[serde(default)]
    pub stop_grace_secs: Option<u64>,
    /// Variables set for every launcher. Applied in key order; each value may
    /// refer to variables set by earlier keys.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

/// Configuration entry for a single launcher.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApplicationConfig {
    /// `theme:<name>` or a file path.
    #[serde(default)]
    pub icon: String,
    /// Label shown for the launcher.
    #[serde(default)]
    pub text: String,
    /// Command line, split with shell quoting rules.
    #[serde(default)]
    pub exec: String,
    /// Working directory; empty inherits the launcher's.
    #[serde(default)]
    pub work: String,
    /// Variables set only for this launcher, on top of the global `env`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The resolved form of a [`Config`]: what the grid is built from.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub main_label: String,
    pub main_icon: Option<IconRef>,
    pub stop_grace: Duration,
    pub launchers: Vec<LauncherSpec>,
}

impl Config {
    /// Expands variables and builds one [`LauncherSpec`] per application.
    ///
    /// `base` is the starting environment (system environment plus built-in
    /// variables). `PATH` is extended first, then the global `env` entries are
    /// applied, then each application's own entries on a private copy.
    pub fn resolve(&self, base: &Environment) -> Resolved {
        let mut env = base.clone();

        let path_entries: Vec<String> = self.path.iter().map(|p| env.substitute(p)).collect();
        env.prepend_path(path_entries);

        for (key, value) in &self.env {
            let value = env.substitute(value);
            env.set(key.clone(), value);
        }

        let launchers = self
            .applications
            .iter()
            .map(|app| app.resolve(&env))
            .collect();

        Resolved {
            main_label: self
                .main_label
                .as_deref()
                .map(|l| env.substitute(l))
                .unwrap_or_else(|| DEFAULT_MAIN_LABEL.to_string()),
            main_icon: self
                .main_icon
                .as_deref()
                .and_then(|i| IconRef::parse(&env.substitute(i))),
            stop_grace: self
                .stop_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_STOP_GRACE),
            launchers,
        }
    }
}

impl ApplicationConfig {
    fn resolve(&self, shared: &Environment) -> LauncherSpec {
        let mut env = shared.clone();
        for (key, value) in &self.env {
            let value = env.substitute(value);
            env.set(key.clone(), value);
        }
        LauncherSpec {
            icon: IconRef::parse(&env.substitute(&self.icon)),
            label: env.substitute(&self.text),
            command: env.substitute(&self.exec),
            working_directory: env.substitute(&self.work),
            environment: env,
        }
    }
}

/// Config used when no config file exists yet.
const BUILTIN_CONFIG: &str = include_str!("../default-conf.toml");

/// Parses the built-in config. Falls back to an empty [`Config`] if it does
/// not parse.
pub fn builtin() -> Config {
    toml::from_str(BUILTIN_CONFIG).unwrap_or_else(|e| {
        log::error!("[config] Built-in config is invalid: {e}");
        Config::default()
    })
}

/// Loads the config file at `path`, returning the built-in config if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::info!("[config] {} not found; using built-in launchers", path.display());
        return Ok(builtin());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<LauncherEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            log::warn!("[config] Failed to create file watcher: {e}");
            return;
        }
    };

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        Some(_) => PathBuf::from("."),
        None => {
            log::warn!("[config] Config path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        log::warn!("[config] Failed to watch {}: {e}", watch_dir.display());
        return;
    }

    let file_name = path.file_name().map(|n| n.to_os_string());
    while let Some(event) = watch_rx.recv().await {
        let affects_config = event
            .paths
            .iter()
            .any(|p| p == path.as_path() || p.file_name().map(|n| n.to_os_string()) == file_name);
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(LauncherEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("[config] Failed to reload config: {e:#}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env() -> Environment {
        [("HOME", "/home/ada"), ("PATH", "/usr/bin")]
            .into_iter()
            .collect()
    }

    fn make_app(text: &str, exec: &str) -> ApplicationConfig {
        ApplicationConfig {
            icon: String::new(),
            text: text.to_string(),
            exec: exec.to_string(),
            work: String::new(),
            env: BTreeMap::new(),
        }
    }

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn config_default_has_no_applications() {
        let c = Config::default();
        assert!(c.applications.is_empty());
        assert!(c.env.is_empty());
        assert!(c.path.is_empty());
    }

    #[test]
    fn resolve_default_uses_default_label_and_grace() {
        let r = Config::default().resolve(&base_env());
        assert_eq!(r.main_label, DEFAULT_MAIN_LABEL);
        assert_eq!(r.main_icon, None);
        assert_eq!(r.stop_grace, DEFAULT_STOP_GRACE);
        assert!(r.launchers.is_empty());
    }

    // ── resolve ───────────────────────────────────────────────────────────────

    #[test]
    fn resolve_substitutes_application_fields() {
        let config = Config {
            applications: vec![ApplicationConfig {
                icon: "${HOME}/icon.png".to_string(),
                text: "Notes of ${HOME}".to_string(),
                exec: "edit ${HOME}/notes.txt".to_string(),
                work: "${HOME}".to_string(),
                env: BTreeMap::new(),
            }],
            ..Config::default()
        };
        let r = config.resolve(&base_env());
        let spec = &r.launchers[0];
        assert_eq!(spec.icon, IconRef::parse("/home/ada/icon.png"));
        assert_eq!(spec.label, "Notes of /home/ada");
        assert_eq!(spec.command, "edit /home/ada/notes.txt");
        assert_eq!(spec.working_directory, "/home/ada");
    }

    #[test]
    fn resolve_keeps_application_order() {
        let config = Config {
            applications: vec![make_app("one", "a"), make_app("two", "b"), make_app("three", "c")],
            ..Config::default()
        };
        let labels: Vec<_> = config
            .resolve(&base_env())
            .launchers
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, vec!["one", "two", "three"]);
    }

    #[test]
    fn resolve_prepends_path_entries() {
        let config = Config {
            path: vec!["${HOME}/bin".to_string(), "/opt/tools".to_string()],
            applications: vec![make_app("x", "x")],
            ..Config::default()
        };
        let r = config.resolve(&base_env());
        let sep = crate::env::PATH_SEPARATOR;
        assert_eq!(
            r.launchers[0].environment.get("PATH"),
            Some(format!("/home/ada/bin{sep}/opt/tools{sep}/usr/bin").as_str())
        );
    }

    #[test]
    fn resolve_global_env_sees_earlier_keys() {
        let mut env = BTreeMap::new();
        env.insert("A_ROOT".to_string(), "${HOME}/sdk".to_string());
        env.insert("B_BIN".to_string(), "${A_ROOT}/bin".to_string());
        let config = Config {
            env,
            applications: vec![make_app("x", "run ${B_BIN}")],
            ..Config::default()
        };
        let r = config.resolve(&base_env());
        let spec = &r.launchers[0];
        assert_eq!(spec.environment.get("A_ROOT"), Some("/home/ada/sdk"));
        assert_eq!(spec.environment.get("B_BIN"), Some("/home/ada/sdk/bin"));
        assert_eq!(spec.command, "run /home/ada/sdk/bin");
    }

    #[test]
    fn resolve_application_env_is_private() {
        let mut first = make_app("first", "a");
        first.env.insert("ONLY_FIRST".to_string(), "1".to_string());
        let config = Config {
            applications: vec![first, make_app("second", "b")],
            ..Config::default()
        };
        let r = config.resolve(&base_env());
        assert_eq!(r.launchers[0].environment.get("ONLY_FIRST"), Some("1"));
        assert!(!r.launchers[1].environment.contains("ONLY_FIRST"));
    }

    #[test]
    fn resolve_application_env_can_be_used_in_exec() {
        let mut app = make_app("x", "${TOOL} --run");
        app.env.insert("TOOL".to_string(), "${HOME}/tool".to_string());
        let config = Config {
            applications: vec![app],
            ..Config::default()
        };
        let r = config.resolve(&base_env());
        assert_eq!(r.launchers[0].command, "/home/ada/tool --run");
    }

    #[test]
    fn resolve_does_not_touch_process_environment() {
        let mut env = BTreeMap::new();
        env.insert("APPLAUNCHER_CONFIG_TEST_ONLY".to_string(), "x".to_string());
        let config = Config {
            env,
            ..Config::default()
        };
        let _ = config.resolve(&base_env());
        assert!(std::env::var("APPLAUNCHER_CONFIG_TEST_ONLY").is_err());
    }

    #[test]
    fn resolve_main_label_icon_and_grace() {
        let config = Config {
            main_label: Some("Tools of ${HOME}".to_string()),
            main_icon: Some("theme:system-run".to_string()),
            stop_grace_secs: Some(2),
            ..Config::default()
        };
        let r = config.resolve(&base_env());
        assert_eq!(r.main_label, "Tools of /home/ada");
        assert_eq!(r.main_icon, Some(IconRef::Themed("system-run".to_string())));
        assert_eq!(r.stop_grace, Duration::from_secs(2));
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.main_label.as_deref(), Some("Dev Tools"));
        assert_eq!(config.applications.len(), 3);
    }

    #[test]
    fn missing_file_resolves_to_builtin_launchers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher-conf.toml");
        let mut base = base_env();
        base.set("APPLICATION_DIR_PATH", "/opt/app");
        base.set("APPLICATION_RESOURCE_PATH", "/opt/app/share/res");
        let r = load_or_default(&path).unwrap().resolve(&base);

        assert_eq!(r.main_label, "Dev Tools");
        assert_eq!(r.stop_grace, Duration::from_secs(5));
        let labels: Vec<_> = r.launchers.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, ["System monitor", "HTTP server", "Ping"]);
        assert_eq!(
            r.launchers[1].icon,
            IconRef::parse("/opt/app/share/res/server.png")
        );
        assert_eq!(r.launchers[2].environment.get("LC_ALL"), Some("C"));
        assert!(r.launchers[0]
            .environment
            .get("PATH")
            .is_some_and(|p| p.starts_with("/opt/app/bin")));
    }

    #[test]
    fn builtin_config_parses() {
        let config: Config = toml::from_str(BUILTIN_CONFIG).unwrap();
        assert!(!config.applications.is_empty());
        assert!(config.applications.iter().all(|a| !a.exec.is_empty()));
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher-conf.toml");
        std::fs::write(
            &path,
            r#"
main_label = "Dev Tools"
main_icon = "theme:applications-development"
path = ["${APPLICATION_DIR_PATH}/bin"]
stop_grace_secs = 3

[env]
JAVA_HOME = "${HOME}/jdk"

[[applications]]
icon = "theme:utilities-terminal"
text = "Terminal"
exec = "xterm -e htop"

[[applications]]
text = "Server"
exec = "./serve --port 8080"
work = "${HOME}/srv"
[applications.env]
PORT = "8080"
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.main_label.as_deref(), Some("Dev Tools"));
        assert_eq!(config.path, vec!["${APPLICATION_DIR_PATH}/bin"]);
        assert_eq!(config.stop_grace_secs, Some(3));
        assert_eq!(config.env.get("JAVA_HOME").map(String::as_str), Some("${HOME}/jdk"));
        assert_eq!(config.applications.len(), 2);
        assert_eq!(config.applications[0].text, "Terminal");
        assert_eq!(config.applications[0].exec, "xterm -e htop");
        assert!(config.applications[0].work.is_empty());
        assert_eq!(config.applications[1].work, "${HOME}/srv");
        assert_eq!(config.applications[1].env.get("PORT").map(String::as_str), Some("8080"));
    }

    #[test]
    fn load_or_default_partial_application_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher-conf.toml");
        std::fs::write(&path, "[[applications]]\nexec = \"true\"\n").unwrap();

        let config = load_or_default(&path).unwrap();
        let app = &config.applications[0];
        assert_eq!(app.exec, "true");
        assert!(app.icon.is_empty());
        assert!(app.text.is_empty());
        assert!(app.env.is_empty());
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher-conf.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn load_or_default_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher-conf.toml");
        std::fs::write(&path, "path = \"not-a-list\"\n").unwrap();
        let err = load_or_default(&path).unwrap_err();
        assert!(format!("{err}").contains("Failed to parse config file"));
    }
}
