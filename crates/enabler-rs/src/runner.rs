//! External command execution
//!
//! Every wrapped tool goes through [`CommandRunner`] so callers can swap the
//! real process launcher for a scripted one in tests.

use crate::error::ToolError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

impl CommandOutput {
    /// Turn a non-zero exit of `program args` into [`ToolError::Failed`]
    pub fn require_success(self, program: &str, args: &[String]) -> Result<Self, ToolError> {
        if self.success() {
            return Ok(self);
        }
        Err(ToolError::Failed {
            command: command_line(program, args),
            code: self.code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs external programs and captures their output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion.
    ///
    /// A non-zero exit is *not* an error here; only a failure to launch is.
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, ToolError>;

    /// Run and require a zero exit, returning stdout
    async fn run(&self, program: &str, args: &[String]) -> Result<String, ToolError> {
        Ok(self.output(program, args).await?.require_success(program, args)?.stdout)
    }
}

/// Render a command line for logs and error messages
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build an owned argument vector from string slices
pub fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Launches real processes
///
/// Programs found in `bin_dir` take precedence over the search path, so
/// binaries downloaded by `setup init` are used even before the user
/// updates their `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    bin_dir: Option<PathBuf>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bin_dir(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: Some(bin_dir.into()),
        }
    }

    fn resolve(&self, program: &str) -> PathBuf {
        if let Some(dir) = &self.bin_dir {
            let local = dir.join(program);
            if local.is_file() {
                return local;
            }
        }
        PathBuf::from(program)
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, ToolError> {
        tracing::debug!("Running: `{}`", command_line(program, args));

        let output = Command::new(self.resolve(program))
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ToolError::NotFound {
                    program: program.to_string(),
                },
                _ => ToolError::Io(e),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
