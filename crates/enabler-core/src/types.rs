//! Domain types for enabler
//!
//! These types represent a local kind cluster as derived from live state.
//! Nothing here is persisted.

use enabler_rs::ContainerSummary;
use enabler_rs::kind::{control_plane_name, worker_prefix};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a named cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterState {
    /// kind does not know the cluster
    Absent,
    /// Cluster exists but its API server does not answer
    Stopped,
    /// Cluster exists and is reachable
    Running,
}

impl ClusterState {
    pub fn symbol(&self) -> &'static str {
        match self {
            ClusterState::Running => "●",
            ClusterState::Stopped => "○",
            ClusterState::Absent => "?",
        }
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterState::Absent => write!(f, "Absent"),
            ClusterState::Stopped => write!(f, "Stopped"),
            ClusterState::Running => write!(f, "Running"),
        }
    }
}

/// Node role in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::ControlPlane => write!(f, "control-plane"),
            NodeRole::Worker => write!(f, "worker"),
        }
    }
}

/// A container backing one cluster node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContainer {
    pub id: String,
    pub name: String,
    pub role: NodeRole,
    pub running: bool,
}

impl NodeContainer {
    /// Classify a container by kind's naming scheme:
    /// `<cluster>-control-plane` and `<cluster>-worker[N]`.
    /// Anything else (e.g. an external load balancer) is not a node.
    pub fn from_summary(cluster: &str, summary: &ContainerSummary) -> Option<Self> {
        let name = summary.name().trim_start_matches('/');
        let role = if name == control_plane_name(cluster) {
            NodeRole::ControlPlane
        } else if name.starts_with(&worker_prefix(cluster)) {
            NodeRole::Worker
        } else {
            return None;
        };
        Some(Self {
            id: summary.id.clone(),
            name: name.to_string(),
            role,
            running: summary.is_running(),
        })
    }
}

/// Result of an add-on install request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    /// Chart major version has no known config format
    UnsupportedVersion(String),
}
