use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// One process to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: Option<String>) -> Self {
        self.cwd = dir;
        self
    }
}

/// Starts processes for a restore. Implementations must not wait for the
/// child to exit.
pub trait Launcher: Send + Sync {
    fn launch(&self, command: &LaunchCommand) -> Result<()>;

    /// Hands `target` (a URL or file) to the system default handler.
    fn open_default(&self, target: &str) -> Result<()>;

    fn path_exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;
}

/// Spawns real, detached child processes.
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, command: &LaunchCommand) -> Result<()> {
        let mut child = Command::new(&command.program);
        child
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = command.cwd.as_deref().filter(|dir| Path::new(dir).is_dir()) {
            child.current_dir(dir);
        }
        child
            .spawn()
            .with_context(|| format!("failed to launch {}", command.program))?;
        Ok(())
    }

    fn open_default(&self, target: &str) -> Result<()> {
        self.launch(&default_opener(target))
    }

    fn path_exists(&self, path: &str) -> bool {
        !path.is_empty() && Path::new(path).exists()
    }

    fn is_dir(&self, path: &str) -> bool {
        !path.is_empty() && Path::new(path).is_dir()
    }
}

fn default_opener(target: &str) -> LaunchCommand {
    opener_for(std::env::consts::OS, target)
}

/// Hands `target` to the shell's protocol handler. No command interpreter
/// sits in between, so `&` in a query string stays part of the URL.
fn opener_for(os: &str, target: &str) -> LaunchCommand {
    match os {
        "windows" => LaunchCommand::new("rundll32")
            .arg("url.dll,FileProtocolHandler")
            .arg(target),
        "macos" => LaunchCommand::new("open").arg(target),
        _ => LaunchCommand::new("xdg-open").arg(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_args_and_dir() {
        let command = LaunchCommand::new("wt")
            .args(["-d", "C:\\src"])
            .current_dir(Some("C:\\src".into()));
        assert_eq!(command.program, "wt");
        assert_eq!(command.args, vec!["-d", "C:\\src"]);
        assert_eq!(command.cwd.as_deref(), Some("C:\\src"));
    }

    #[test]
    fn default_opener_passes_target_last() {
        let command = default_opener("https://docs.rs");
        assert_eq!(command.args.last().map(String::as_str), Some("https://docs.rs"));
    }

    #[test]
    fn windows_opener_keeps_query_string_in_one_argument() {
        let url = "https://x.dev/?a=1&b=2";
        let command = opener_for("windows", url);
        assert_eq!(command.program, "rundll32");
        assert_eq!(command.args, vec!["url.dll,FileProtocolHandler", url]);
        assert!(command.args.iter().all(|arg| arg != "/C"));
    }

    #[test]
    fn unix_openers_take_the_target_as_sole_argument() {
        assert_eq!(opener_for("macos", "https://a.dev").program, "open");
        let linux = opener_for("linux", "https://a.dev/?q=1&r=2");
        assert_eq!(linux.program, "xdg-open");
        assert_eq!(linux.args, vec!["https://a.dev/?q=1&r=2"]);
    }

    #[test]
    fn missing_program_is_reported() {
        let result = ProcessLauncher.launch(&LaunchCommand::new("desksession-no-such-binary"));
        assert!(result.is_err());
    }

    #[test]
    fn path_checks_reject_empty_paths() {
        assert!(!ProcessLauncher.path_exists(""));
        assert!(!ProcessLauncher.is_dir(""));
        let dir = tempfile::TempDir::new().unwrap();
        assert!(ProcessLauncher.is_dir(&dir.path().to_string_lossy()));
    }
}
