//! Agent CLI launch command
//!
//! Produces `<bin> -p --output-format stream-json --input-format stream-json
//! --verbose [--model M] [--resume S] (--allowedTools a,b | --dangerously-skip-permissions)`
//! and turns it into a tokio `Command` with all three standard streams piped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Argument vector for one agent launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![
                "-p".to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--input-format".to_string(),
                "stream-json".to_string(),
                "--verbose".to_string(),
            ],
            working_dir: None,
        }
    }

    pub fn model(mut self, model: Option<&str>) -> Self {
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            self.args.push("--model".to_string());
            self.args.push(model.to_string());
        }
        self
    }

    /// Continue an earlier agent session
    pub fn resume(mut self, session_id: Option<&str>) -> Self {
        if let Some(session_id) = session_id.filter(|s| !s.is_empty()) {
            self.args.push("--resume".to_string());
            self.args.push(session_id.to_string());
        }
        self
    }

    /// Restrict to `tools`; an empty list means no permission prompts at all
    pub fn permissions(mut self, tools: &[String]) -> Self {
        if tools.is_empty() {
            self.args.push("--dangerously-skip-permissions".to_string());
        } else {
            self.args.push("--allowedTools".to_string());
            self.args.push(tools.join(","));
        }
        self
    }

    pub fn working_dir(mut self, dir: Option<&Path>) -> Self {
        self.working_dir = dir.map(Path::to_path_buf);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Whether the launch has to go through a shell string.
    ///
    /// Only Windows needs it, and only when the binary path has whitespace.
    pub fn needs_shell(&self) -> bool {
        cfg!(windows) && self.program.contains(char::is_whitespace)
    }

    /// Shell string with whitespace-containing arguments double-quoted
    pub fn shell_string(&self) -> String {
        self.argv()
            .iter()
            .map(|arg| {
                if arg.contains(char::is_whitespace) {
                    format!("\"{}\"", arg)
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `cmd.exe` arguments wrapping the shell string.
    ///
    /// `/S` makes cmd strip exactly the outer quote pair, so the quoted
    /// binary path inside survives.
    pub fn cmd_args(&self) -> String {
        format!("/S /C \"{}\"", self.shell_string())
    }

    /// tokio command with stdin/stdout/stderr piped
    pub fn to_command(&self) -> Command {
        let mut cmd = if self.needs_shell() {
            self.shell_command()
        } else {
            let mut cmd = Command::new(&self.program);
            cmd.args(&self.args);
            cmd
        };

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    // Passed raw: the default argument quoting would escape the embedded
    // quotes as \" which cmd.exe does not understand
    #[cfg(windows)]
    fn shell_command(&self) -> Command {
        let mut cmd = Command::new("cmd");
        cmd.raw_arg(self.cmd_args());
        cmd
    }

    #[cfg(not(windows))]
    fn shell_command(&self) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(self.shell_string());
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_command() {
        let cmd = LaunchCommand::new("claude").model(None).permissions(&[]);
        let argv = cmd.argv();
        assert_eq!(argv[0], "claude");
        assert!(argv.contains(&"-p".to_string()));
        assert!(argv.contains(&"stream-json".to_string()));
        assert!(argv.contains(&"--verbose".to_string()));
        assert!(argv.contains(&"--dangerously-skip-permissions".to_string()));
        assert!(!argv.contains(&"--allowedTools".to_string()));
        assert!(!argv.contains(&"--model".to_string()));
    }

    #[test]
    fn test_allowed_tools_replace_skip_permissions() {
        let cmd = LaunchCommand::new("claude").permissions(&tools(&["Read", "Write", "Bash"]));
        let args = cmd.args();
        let idx = args.iter().position(|a| a == "--allowedTools").unwrap();
        assert_eq!(args[idx + 1], "Read,Write,Bash");
        assert!(!args.contains(&"--dangerously-skip-permissions".to_string()));
    }

    #[test]
    fn test_model_and_resume() {
        let cmd = LaunchCommand::new("/usr/local/bin/claude")
            .model(Some("claude-opus-4-6"))
            .resume(Some("sess-1"));
        assert_eq!(cmd.program(), "/usr/local/bin/claude");
        let args = cmd.args();
        let idx = args.iter().position(|a| a == "--model").unwrap();
        assert_eq!(args[idx + 1], "claude-opus-4-6");
        let idx = args.iter().position(|a| a == "--resume").unwrap();
        assert_eq!(args[idx + 1], "sess-1");
    }

    #[test]
    fn test_empty_model_is_ignored() {
        let cmd = LaunchCommand::new("claude").model(Some("")).resume(Some(""));
        assert!(!cmd.args().contains(&"--model".to_string()));
        assert!(!cmd.args().contains(&"--resume".to_string()));
    }

    #[test]
    fn test_shell_string_quotes_whitespace() {
        let cmd = LaunchCommand::new(r"C:\Program Files\claude.exe").model(Some("m"));
        assert!(cmd
            .shell_string()
            .starts_with(r#""C:\Program Files\claude.exe" -p --output-format"#));
        assert_eq!(cmd.needs_shell(), cfg!(windows));
    }

    #[test]
    fn test_cmd_args_keep_quotes_unescaped() {
        let cmd = LaunchCommand::new(r"C:\Program Files\claude.exe").permissions(&[]);
        let args = cmd.cmd_args();
        assert!(args.starts_with(r#"/S /C ""C:\Program Files\claude.exe" -p "#), "{args}");
        assert!(args.ends_with(r#"--dangerously-skip-permissions""#), "{args}");
        assert!(!args.contains(r#"\""#), "{args}");
    }
}
