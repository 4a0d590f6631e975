//! Kind cluster lifecycle
//!
//! A cluster moves between three states, always re-derived from live
//! state:
//!
//! - **Absent**: `kind get clusters` does not list it
//! - **Stopped**: listed, but `kubectl cluster-info` fails
//! - **Running**: listed and reachable
//!
//! Start and stop act on the node containers directly, since kind itself
//! has no such commands. Kind labels every node container with
//! `io.x-k8s.kind.cluster=<name>` and names them `<name>-control-plane` and
//! `<name>-worker[N]`.

use crate::error::{CoreError, Result};
use crate::kind_config::validate_cluster_config;
use crate::poll::{PollOutcome, PollPolicy, Sleeper, poll_until};
use crate::types::{ClusterState, NodeContainer, NodeRole};
use async_trait::async_trait;
use enabler_rs::kind::{CLUSTER_LABEL, context_name};
use enabler_rs::{CommandRunner, Docker, Kind, Kubectl};
use std::path::Path;
use tracing::{debug, info};

/// Container port the kube API server listens on
const API_SERVER_PORT: &str = "6443/tcp";

/// Answers the two questions cluster state is derived from
#[async_trait]
pub trait ClusterInspector: Send + Sync {
    /// Does kind know a cluster by this name?
    async fn exists(&self, name: &str) -> Result<bool>;
    /// Does the cluster's API server answer?
    async fn reachable(&self, name: &str) -> Result<bool>;
}

/// Inspector backed by `kind get clusters` and `kubectl cluster-info`
pub struct ToolInspector<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ToolInspector<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ClusterInspector for ToolInspector<'_> {
    async fn exists(&self, name: &str) -> Result<bool> {
        let clusters = Kind::new(self.runner).get_clusters().await?;
        Ok(clusters.iter().any(|c| c == name))
    }

    async fn reachable(&self, name: &str) -> Result<bool> {
        Ok(Kubectl::new(self.runner)
            .cluster_reachable(&context_name(name))
            .await?)
    }
}

/// What `start` ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Cluster answered before anything was touched
    AlreadyRunning,
    /// Containers were started and the cluster answered on this attempt
    Started { attempts: u32 },
}

/// What `stop` ended up doing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    pub stopped: Vec<String>,
    pub already_stopped: Vec<String>,
}

/// Drives create / delete / start / stop / status of a kind cluster
pub struct ClusterController<'a> {
    runner: &'a dyn CommandRunner,
    inspector: &'a dyn ClusterInspector,
    sleeper: &'a dyn Sleeper,
    policy: PollPolicy,
}

impl<'a> ClusterController<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        inspector: &'a dyn ClusterInspector,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            runner,
            inspector,
            sleeper,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current state. Reachability is only queried for clusters that exist.
    pub async fn status(&self, name: &str) -> Result<ClusterState> {
        if !self.inspector.exists(name).await? {
            return Ok(ClusterState::Absent);
        }
        if self.inspector.reachable(name).await? {
            Ok(ClusterState::Running)
        } else {
            Ok(ClusterState::Stopped)
        }
    }

    /// Create a cluster from a kind config file. Only valid from Absent.
    pub async fn create(&self, name: &str, config: &Path) -> Result<ClusterState> {
        validate_cluster_config(config)?;

        if self.inspector.exists(name).await? {
            return Err(CoreError::ClusterExists(name.to_string()));
        }

        info!("Creating kind cluster '{}' from {}", name, config.display());
        let progress = Kind::new(self.runner).create_cluster(name, config).await?;
        for line in progress.lines().map(str::trim).filter(|l| !l.is_empty()) {
            info!("{}", line);
        }
        info!("Kind cluster '{}' created", name);
        Ok(ClusterState::Running)
    }

    /// Delete a cluster. Refuses when kind does not know it.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if !self.inspector.exists(name).await? {
            return Err(CoreError::ClusterNotFound(name.to_string()));
        }
        Kind::new(self.runner).delete_cluster(name).await?;
        info!("Kind cluster '{}' deleted", name);
        Ok(())
    }

    /// Start the node containers of a stopped cluster and wait for the API
    /// server to answer.
    pub async fn start(&self, name: &str) -> Result<StartOutcome> {
        match self.status(name).await? {
            ClusterState::Absent => return Err(CoreError::ClusterNotFound(name.to_string())),
            ClusterState::Running => {
                info!("Kind cluster '{}' is running", name);
                return Ok(StartOutcome::AlreadyRunning);
            }
            ClusterState::Stopped => {}
        }

        let containers = self.containers(name).await?;
        let control_plane = containers
            .iter()
            .find(|c| c.role == NodeRole::ControlPlane)
            .ok_or_else(|| CoreError::ControlPlaneNotFound(name.to_string()))?;

        let docker = Docker::new(self.runner);
        if control_plane.running {
            debug!("Container {} is running", control_plane.name);
        } else {
            docker.start(&control_plane.id).await?;
            debug!("Container {} started", control_plane.name);
        }
        // The published API server port changes across container restarts
        self.configure_endpoint(name, control_plane).await?;

        for worker in containers.iter().filter(|c| c.role == NodeRole::Worker) {
            docker.start(&worker.id).await?;
            info!("Container {} started", worker.name);
        }

        debug!("Cluster components started. Waiting for cluster to be ready");
        let outcome = poll_until(&self.policy, self.sleeper, || self.inspector.reachable(name)).await?;
        match outcome {
            PollOutcome::Ready { attempts } => {
                info!("Kind cluster '{}' started!", name);
                Ok(StartOutcome::Started { attempts })
            }
            PollOutcome::Exhausted { attempts } => Err(CoreError::StartTimeout {
                name: name.to_string(),
                attempts,
            }),
        }
    }

    /// Stop every running node container. No waiting afterwards.
    pub async fn stop(&self, name: &str) -> Result<StopReport> {
        if !self.inspector.exists(name).await? {
            return Err(CoreError::ClusterNotFound(name.to_string()));
        }

        let docker = Docker::new(self.runner);
        let mut report = StopReport::default();
        for container in self.containers(name).await? {
            if container.running {
                docker.stop(&container.id).await?;
                debug!("Container {} stopped", container.name);
                report.stopped.push(container.name);
            } else {
                debug!("Container {} is already stopped", container.name);
                report.already_stopped.push(container.name);
            }
        }
        info!("Kind cluster '{}' was stopped.", name);
        Ok(report)
    }

    /// Node containers of a cluster, control plane first
    async fn containers(&self, name: &str) -> Result<Vec<NodeContainer>> {
        let label = format!("{CLUSTER_LABEL}={name}");
        let mut containers: Vec<NodeContainer> = Docker::new(self.runner)
            .containers_with_label(&label)
            .await?
            .iter()
            .filter_map(|summary| NodeContainer::from_summary(name, summary))
            .collect();
        containers.sort_by_key(|c| (c.role != NodeRole::ControlPlane, c.name.clone()));
        Ok(containers)
    }

    /// Point the kind context at the API server port currently published
    /// by the control-plane container.
    async fn configure_endpoint(&self, name: &str, control_plane: &NodeContainer) -> Result<u16> {
        let port = Docker::new(self.runner)
            .host_port(&control_plane.id, API_SERVER_PORT)
            .await?
            .ok_or_else(|| CoreError::PortNotPublished {
                container: control_plane.name.clone(),
                port: API_SERVER_PORT.to_string(),
            })?;
        let server = format!("https://127.0.0.1:{port}");
        Kubectl::new(self.runner)
            .set_cluster_server(&context_name(name), &server)
            .await?;
        debug!("Reconfigured kubeconfig for {} to {}", context_name(name), server);
        Ok(port)
    }
}
