//! istioctl command execution

use crate::error::ToolError;
use crate::runner::{CommandRunner, CommandOutput, args};

/// Thin wrapper over the `istioctl` binary
pub struct Istioctl<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Istioctl<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Pre-install verification. istioctl reports on stderr even on success,
    /// so the whole output is returned.
    ///
    /// Executes: istioctl verify-install --context <context>
    pub async fn verify_install(&self, context: &str) -> Result<CommandOutput, ToolError> {
        let argv = args(["verify-install", "--context", context]);
        let output = self.runner.output("istioctl", &argv).await?;
        if !output.success() {
            return Err(ToolError::Failed {
                command: crate::runner::command_line("istioctl", &argv),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Executes: istioctl manifest apply -y --set <s>... --context <context> --wait
    pub async fn manifest_apply(&self, context: &str, sets: &[String]) -> Result<String, ToolError> {
        let mut argv = args(["manifest", "apply", "-y"]);
        for set in sets {
            argv.push("--set".to_string());
            argv.push(set.clone());
        }
        argv.extend(args(["--context", context, "--wait"]));
        self.runner.run("istioctl", &argv).await
    }
}
