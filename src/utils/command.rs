//! Command execution primitives with consistent error handling.

use serde::Serialize;
use std::path::Path;
use std::process::{Command, Output};

use crate::error::CommandFailedDetails;

/// Captured output from command execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedOutput {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

/// Result of a finished process, whether or not it succeeded.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    fn from_output(out: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        }
    }

    fn spawn_failed(e: std::io::Error) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("Command error: {}", e),
            success: false,
            exit_code: -1,
        }
    }

    pub fn captured(&self) -> CapturedOutput {
        CapturedOutput {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }

    pub fn failure_details(&self, command: impl Into<String>) -> CommandFailedDetails {
        CommandFailedDetails {
            command: command.into(),
            exit_code: self.exit_code,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }

    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Run a program with arguments, capturing output. Never fails; spawn
/// errors become an unsuccessful output with exit code -1.
pub fn exec(program: &str, args: &[&str], dir: Option<&Path>) -> CommandOutput {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    match cmd.output() {
        Ok(out) => CommandOutput::from_output(out),
        Err(e) => CommandOutput::spawn_failed(e),
    }
}

/// Run a command line through the platform shell.
pub fn exec_shell(command: &str, dir: Option<&Path>) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    match cmd.output() {
        Ok(out) => CommandOutput::from_output(out),
        Err(e) => CommandOutput::spawn_failed(e),
    }
}

/// Render a program invocation for diagnostics.
pub fn display(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
