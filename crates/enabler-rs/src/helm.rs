//! helm command execution

use crate::error::ToolError;
use crate::runner::{CommandRunner, args};

/// A chart installation request
#[derive(Debug, Clone)]
pub struct InstallRequest<'r> {
    pub release: &'r str,
    /// Chart reference, e.g. `bitnami/metallb`
    pub chart: &'r str,
    pub version: &'r str,
    pub namespace: &'r str,
    /// kubectl context name
    pub context: &'r str,
    /// `--set key=value` overrides
    pub values: &'r [String],
    /// Block until resources are ready
    pub wait: bool,
}

impl InstallRequest<'_> {
    fn to_args(&self) -> Vec<String> {
        let mut argv = args([
            "install",
            self.release,
            "--kube-context",
            self.context,
            "--version",
            self.version,
            self.chart,
            "-n",
            self.namespace,
        ]);
        for value in self.values {
            argv.push("--set".to_string());
            argv.push(value.clone());
        }
        if self.wait {
            argv.push("--wait".to_string());
        }
        argv
    }
}

/// Thin wrapper over the `helm` binary
pub struct Helm<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Helm<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Whether a release is already installed.
    ///
    /// Executes: helm status <release> -n <namespace> --kube-context <context>
    pub async fn release_exists(
        &self,
        context: &str,
        namespace: &str,
        release: &str,
    ) -> Result<bool, ToolError> {
        let output = self
            .runner
            .output(
                "helm",
                &args([
                    "status",
                    release,
                    "-n",
                    namespace,
                    "--kube-context",
                    context,
                ]),
            )
            .await?;
        if output.success() {
            tracing::debug!("{}", output.stdout.trim());
        }
        Ok(output.success())
    }

    /// Executes: helm repo add <name> <url>
    pub async fn repo_add(&self, name: &str, url: &str) -> Result<String, ToolError> {
        self.runner
            .run("helm", &args(["repo", "add", name, url]))
            .await
    }

    /// Executes: helm repo update
    pub async fn repo_update(&self) -> Result<String, ToolError> {
        self.runner.run("helm", &args(["repo", "update"])).await
    }

    /// Executes: helm install <release> ... <chart> -n <namespace> [--wait]
    pub async fn install(&self, request: &InstallRequest<'_>) -> Result<String, ToolError> {
        self.runner.run("helm", &request.to_args()).await
    }
}
