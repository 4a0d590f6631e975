//! enabler-core: what enabler does with the tools it drives
//!
//! Cluster lifecycle, add-on installation, dependency provisioning,
//! submodule reporting and preflight checks. External processes are only
//! reached through [`enabler_rs::CommandRunner`], so everything here runs
//! against a scripted runner in tests.

pub mod addons;
pub mod cluster;
pub mod config;
pub mod error;
pub mod git;
pub mod keys;
pub mod kind_config;
pub mod metallb;
pub mod network;
pub mod poll;
pub mod preflight;
pub mod provision;
pub mod types;

#[cfg(test)]
mod testing;

pub use addons::AddonInstaller;
pub use cluster::{ClusterController, ClusterInspector, StartOutcome, StopReport, ToolInspector};
pub use config::{DEFAULT_KUBE_CONTEXT, Settings, resolve_kube_context};
pub use error::{CoreError, Result};
pub use poll::{PollOutcome, PollPolicy, Sleeper, TokioSleeper};
pub use types::{ClusterState, InstallOutcome, NodeContainer, NodeRole};
