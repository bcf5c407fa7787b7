use std::path::PathBuf;

use crate::env::Environment;

/// Icon shown for a launcher or the main window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconRef {
    /// Looked up by name in the desktop icon theme (`theme:<name>`).
    Themed(String),
    /// Loaded from a file path.
    File(PathBuf),
}

impl IconRef {
    /// Parses a config icon string. Returns `None` for an empty string.
    pub fn parse(value: &str) -> Option<Self> {
        if value.is_empty() {
            return None;
        }
        match value.strip_prefix("theme:") {
            Some(name) => Some(Self::Themed(name.to_string())),
            None => Some(Self::File(PathBuf::from(value))),
        }
    }
}

impl std::fmt::Display for IconRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Themed(name) => write!(f, "theme:{name}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One runnable entry of the launcher, fully resolved.
#[derive(Debug, Clone)]
pub struct LauncherSpec {
    pub icon: Option<IconRef>,
    pub label: String,
    /// Unsplit command line; split with shell quoting rules at start time.
    pub command: String,
    /// Empty means "inherit the launcher's working directory".
    pub working_directory: String,
    pub environment: Environment,
}

/// A command line split into program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl LauncherSpec {
    /// Splits [`command`](Self::command) into program + arguments.
    ///
    /// Returns `None` if the command is empty, whitespace only, or has
    /// unbalanced quotes.
    pub fn command_line(&self) -> Option<CommandLine> {
        let mut parts = shell_words::split(&self.command).ok()?;
        if parts.is_empty() {
            return None;
        }
        let program = parts.remove(0);
        Some(CommandLine { program, args: parts })
    }

    pub fn working_directory(&self) -> Option<&str> {
        (!self.working_directory.is_empty()).then_some(self.working_directory.as_str())
    }
}

#[cfg(test)]
pub fn make_spec(command: &str) -> LauncherSpec {
    LauncherSpec {
        icon: None,
        label: "test".to_string(),
        command: command.to_string(),
        working_directory: String::new(),
        environment: Environment::from_system(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── IconRef ───────────────────────────────────────────────────────────────

    #[test]
    fn icon_theme_prefix_is_themed() {
        assert_eq!(
            IconRef::parse("theme:utilities-terminal"),
            Some(IconRef::Themed("utilities-terminal".to_string()))
        );
    }

    #[test]
    fn icon_without_prefix_is_file() {
        assert_eq!(
            IconRef::parse("/usr/share/icons/app.png"),
            Some(IconRef::File(PathBuf::from("/usr/share/icons/app.png")))
        );
    }

    #[test]
    fn icon_empty_is_none() {
        assert_eq!(IconRef::parse(""), None);
    }

    #[test]
    fn icon_display_round_trips_config_form() {
        let icon = IconRef::parse("theme:system-run").unwrap();
        assert_eq!(icon.to_string(), "theme:system-run");
    }

    // ── command_line ──────────────────────────────────────────────────────────

    #[test]
    fn command_line_splits_program_and_args() {
        let cl = make_spec("echo hello world").command_line().unwrap();
        assert_eq!(cl.program, "echo");
        assert_eq!(cl.args, vec!["hello", "world"]);
    }

    #[test]
    fn command_line_honours_quotes() {
        let cl = make_spec(r#"sh -c 'echo "a b"'"#).command_line().unwrap();
        assert_eq!(cl.program, "sh");
        assert_eq!(cl.args, vec!["-c", r#"echo "a b""#]);
    }

    #[test]
    fn command_line_empty_is_none() {
        assert!(make_spec("").command_line().is_none());
        assert!(make_spec("   \t ").command_line().is_none());
    }

    #[test]
    fn command_line_unbalanced_quote_is_none() {
        assert!(make_spec("echo 'oops").command_line().is_none());
    }

    #[test]
    fn working_directory_empty_means_inherit() {
        let mut spec = make_spec("true");
        assert_eq!(spec.working_directory(), None);
        spec.working_directory = "/tmp".to_string();
        assert_eq!(spec.working_directory(), Some("/tmp"));
    }
}
