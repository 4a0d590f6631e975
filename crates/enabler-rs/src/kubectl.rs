//! kubectl command execution

use crate::error::ToolError;
use crate::runner::{CommandRunner, args};
use std::path::Path;

/// Thin wrapper over the `kubectl` binary
///
/// All methods take the kubectl context name (`kind-<cluster>`), not the
/// bare cluster name.
pub struct Kubectl<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Kubectl<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Whether the API server behind `context` answers.
    ///
    /// Executes: kubectl cluster-info --context <context>
    pub async fn cluster_reachable(&self, context: &str) -> Result<bool, ToolError> {
        let output = self
            .runner
            .output("kubectl", &args(["cluster-info", "--context", context]))
            .await?;
        if output.success() {
            tracing::debug!("{}", output.stdout.trim());
        } else {
            tracing::debug!("{}", output.stderr.trim());
        }
        Ok(output.success())
    }

    /// Executes: kubectl cluster-info --context <context>
    pub async fn cluster_info(&self, context: &str) -> Result<String, ToolError> {
        self.runner
            .run("kubectl", &args(["cluster-info", "--context", context]))
            .await
    }

    /// Point `context`'s cluster entry at a new API server URL.
    ///
    /// Executes: kubectl config set-cluster <context> --server <server>
    pub async fn set_cluster_server(&self, context: &str, server: &str) -> Result<(), ToolError> {
        let output = self
            .runner
            .run(
                "kubectl",
                &args(["config", "set-cluster", context, "--server", server]),
            )
            .await?;
        tracing::debug!("{}", output.trim());
        Ok(())
    }

    /// Executes: kubectl get ns <name> --context <context>
    pub async fn namespace_exists(&self, context: &str, name: &str) -> Result<bool, ToolError> {
        let output = self
            .runner
            .output("kubectl", &args(["get", "ns", name, "--context", context]))
            .await?;
        Ok(output.success())
    }

    /// Executes: kubectl create ns <name> --context <context>
    pub async fn create_namespace(&self, context: &str, name: &str) -> Result<(), ToolError> {
        self.runner
            .run("kubectl", &args(["create", "ns", name, "--context", context]))
            .await?;
        Ok(())
    }

    /// Executes: kubectl label namespace <name> <label> --context <context>
    pub async fn label_namespace(
        &self,
        context: &str,
        name: &str,
        label: &str,
    ) -> Result<(), ToolError> {
        self.runner
            .run(
                "kubectl",
                &args(["label", "namespace", name, label, "--context", context]),
            )
            .await?;
        Ok(())
    }

    /// Executes: kubectl get deployment <name> -n <namespace> --context <context>
    pub async fn deployment_exists(
        &self,
        context: &str,
        namespace: &str,
        name: &str,
    ) -> Result<bool, ToolError> {
        let output = self
            .runner
            .output(
                "kubectl",
                &args([
                    "get",
                    "deployment",
                    name,
                    "-n",
                    namespace,
                    "--context",
                    context,
                ]),
            )
            .await?;
        Ok(output.success())
    }

    /// Executes: kubectl apply -f <file> --context <context>
    pub async fn apply_file(&self, context: &str, file: &Path) -> Result<String, ToolError> {
        let file = file.to_string_lossy();
        self.runner
            .run("kubectl", &args(["apply", "-f", &*file, "--context", context]))
            .await
    }

    /// First load balancer ingress IP of a service, if assigned
    ///
    /// Executes: kubectl --context <context> -n <ns> get service <name> -o jsonpath=...
    pub async fn load_balancer_ip(
        &self,
        context: &str,
        namespace: &str,
        service: &str,
    ) -> Result<Option<String>, ToolError> {
        let output = self
            .runner
            .run(
                "kubectl",
                &args([
                    "--context",
                    context,
                    "-n",
                    namespace,
                    "get",
                    "service",
                    service,
                    "-o",
                    "jsonpath={.status.loadBalancer.ingress[0].ip}",
                ]),
            )
            .await?;
        let ip = output.trim();
        Ok((!ip.is_empty()).then(|| ip.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns one canned output and records the command line
    struct Canned {
        output: CommandOutput,
        seen: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(output: CommandOutput) -> Self {
            Self {
                output,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for Canned {
        async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, ToolError> {
            self.seen
                .lock()
                .unwrap()
                .push(crate::runner::command_line(program, args));
            Ok(self.output.clone())
        }
    }

    #[tokio::test]
    async fn test_load_balancer_ip() {
        let runner = Canned::new(CommandOutput::ok("172.18.255.245"));
        let ip = Kubectl::new(&runner)
            .load_balancer_ip("kind-keitaro", "istio-system", "istio-ingressgateway")
            .await
            .unwrap();
        assert_eq!(ip.as_deref(), Some("172.18.255.245"));
        assert!(runner.seen.lock().unwrap()[0]
            .starts_with("kubectl --context kind-keitaro -n istio-system get service"));

        let pending = Canned::new(CommandOutput::ok(""));
        let ip = Kubectl::new(&pending)
            .load_balancer_ip("kind-keitaro", "istio-system", "istio-ingressgateway")
            .await
            .unwrap();
        assert_eq!(ip, None);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_not_an_error() {
        let runner = Canned::new(CommandOutput::failed(1, "connection refused"));
        let kubectl = Kubectl::new(&runner);
        assert!(!kubectl.cluster_reachable("kind-keitaro").await.unwrap());
        assert!(!kubectl.namespace_exists("kind-keitaro", "shop").await.unwrap());

        let err = kubectl.cluster_info("kind-keitaro").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
