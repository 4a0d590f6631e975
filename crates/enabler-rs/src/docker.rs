//! docker command execution
//!
//! Container and network state is read through the docker CLI's JSON
//! output rather than the engine API, so the same [`CommandRunner`] seam
//! covers every external collaborator.

use crate::error::ToolError;
use crate::runner::{CommandRunner, args};
use serde::Deserialize;
use std::collections::HashMap;

/// One row of `docker ps`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "ID")]
    pub id: String,
    /// Comma separated when a container has several names
    #[serde(rename = "Names")]
    pub names: String,
    /// running, exited, created, paused, ...
    #[serde(rename = "State")]
    pub state: String,
}

impl ContainerSummary {
    /// Primary container name
    pub fn name(&self) -> &str {
        self.names.split(',').next().unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, Deserialize)]
struct PortBinding {
    #[serde(rename = "HostPort")]
    host_port: String,
}

#[derive(Debug, Deserialize)]
struct IpamConfig {
    #[serde(rename = "Subnet")]
    subnet: Option<String>,
}

/// Thin wrapper over the `docker` binary
pub struct Docker<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Docker<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// All containers, running or not, carrying `label`
    ///
    /// Executes: docker ps -a --filter label=<label> --format {{json .}}
    pub async fn containers_with_label(
        &self,
        label: &str,
    ) -> Result<Vec<ContainerSummary>, ToolError> {
        let filter = format!("label={label}");
        let output = self
            .runner
            .run(
                "docker",
                &args(["ps", "-a", "--filter", &filter, "--format", "{{json .}}"]),
            )
            .await?;
        parse_container_list(&output)
    }

    /// Executes: docker start <id>
    pub async fn start(&self, id: &str) -> Result<(), ToolError> {
        self.runner.run("docker", &args(["start", id])).await?;
        Ok(())
    }

    /// Executes: docker stop <id>
    pub async fn stop(&self, id: &str) -> Result<(), ToolError> {
        self.runner.run("docker", &args(["stop", id])).await?;
        Ok(())
    }

    /// Host port published for a container port such as `6443/tcp`
    ///
    /// Executes: docker inspect --format {{json .NetworkSettings.Ports}} <id>
    pub async fn host_port(&self, id: &str, container_port: &str) -> Result<Option<u16>, ToolError> {
        let output = self
            .runner
            .run(
                "docker",
                &args(["inspect", "--format", "{{json .NetworkSettings.Ports}}", id]),
            )
            .await?;
        parse_host_port(&output, container_port)
    }

    /// Subnets from a network's IPAM config, in declaration order. `None`
    /// when the network does not exist.
    ///
    /// Executes: docker network inspect <name> --format {{json .IPAM.Config}}
    pub async fn network_subnets(&self, name: &str) -> Result<Option<Vec<String>>, ToolError> {
        let argv = args(["network", "inspect", name, "--format", "{{json .IPAM.Config}}"]);
        let output = self.runner.output("docker", &argv).await?;
        if !output.success() {
            if output.stderr.contains("No such network") {
                return Ok(None);
            }
            return Err(ToolError::Failed {
                command: crate::runner::command_line("docker", &argv),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        parse_subnets(&output.stdout).map(Some)
    }
}

fn parse_container_list(output: &str) -> Result<Vec<ContainerSummary>, ToolError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(ToolError::from))
        .collect()
}

fn parse_host_port(output: &str, container_port: &str) -> Result<Option<u16>, ToolError> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    let ports: HashMap<String, Option<Vec<PortBinding>>> = serde_json::from_str(trimmed)?;
    let Some(binding) = ports
        .get(container_port)
        .and_then(|b| b.as_ref())
        .and_then(|b| b.first())
    else {
        return Ok(None);
    };
    binding
        .host_port
        .parse()
        .map(Some)
        .map_err(|e| ToolError::parse("host port", format!("{}: {e}", binding.host_port)))
}

fn parse_subnets(output: &str) -> Result<Vec<String>, ToolError> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let configs: Vec<IpamConfig> = serde_json::from_str(trimmed)?;
    Ok(configs.into_iter().filter_map(|c| c.subnet).collect())
}
