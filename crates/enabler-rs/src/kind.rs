//! kind command execution

use crate::error::ToolError;
use crate::runner::{CommandRunner, args};
use std::path::Path;

/// Label kind puts on every node container of a cluster
pub const CLUSTER_LABEL: &str = "io.x-k8s.kind.cluster";

/// Docker network kind attaches cluster nodes to
pub const NETWORK_NAME: &str = "kind";

/// kubectl context name kind writes for a cluster
pub fn context_name(cluster: &str) -> String {
    format!("kind-{cluster}")
}

/// Container name of a cluster's control-plane node
pub fn control_plane_name(cluster: &str) -> String {
    format!("{cluster}-control-plane")
}

/// Name prefix shared by a cluster's worker containers
pub fn worker_prefix(cluster: &str) -> String {
    format!("{cluster}-worker")
}

/// Thin wrapper over the `kind` binary
pub struct Kind<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Kind<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Names of all kind clusters
    ///
    /// Executes: kind get clusters
    pub async fn get_clusters(&self) -> Result<Vec<String>, ToolError> {
        let output = self.runner.run("kind", &args(["get", "clusters"])).await?;
        Ok(parse_cluster_list(&output))
    }

    /// Create a cluster and return its progress output. kind reports
    /// progress on stderr, so both streams are returned, stderr first.
    ///
    /// Executes: kind create cluster --name <name> --config <config>
    pub async fn create_cluster(&self, name: &str, config: &Path) -> Result<String, ToolError> {
        let config = config.to_string_lossy();
        let argv = args(["create", "cluster", "--name", name, "--config", &*config]);
        let output = self
            .runner
            .output("kind", &argv)
            .await?
            .require_success("kind", &argv)?;
        Ok(format!("{}{}", output.stderr, output.stdout))
    }

    /// Executes: kind delete cluster --name <name>
    pub async fn delete_cluster(&self, name: &str) -> Result<(), ToolError> {
        self.runner
            .run("kind", &args(["delete", "cluster", "--name", name]))
            .await?;
        Ok(())
    }
}

/// `kind get clusters` prints one name per line, or a notice on stderr when
/// there are none.
fn parse_cluster_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
