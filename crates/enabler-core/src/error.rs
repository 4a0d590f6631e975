//! Error types for enabler-core

use enabler_rs::ToolError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by platform operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Neither the command nor the global options named a context
    #[error("--kube-context was not specified")]
    ContextNotSpecified,

    /// Settings file could not be found
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Kind cluster config is missing or has the wrong extension
    #[error("Cluster config file not found: {0} (expected an existing .yaml or .yml file)")]
    ClusterConfigNotFound(PathBuf),

    /// Kind cluster config is not valid YAML
    #[error("Invalid cluster config {path}: {message}")]
    ClusterConfigInvalid { path: PathBuf, message: String },

    #[error("Kind cluster '{0}' already exists")]
    ClusterExists(String),

    #[error("Kind cluster '{0}' does not exist")]
    ClusterNotFound(String),

    /// Cluster exists but its API server does not answer
    #[error("Kind cluster '{0}' is not running. Please start the cluster")]
    ClusterNotRunning(String),

    #[error("Couldn't start kind cluster '{name}': not reachable after {attempts} attempts")]
    StartTimeout { name: String, attempts: u32 },

    #[error("No control plane container found for cluster '{0}'")]
    ControlPlaneNotFound(String),

    #[error("Container {container} has no host port published for {port}")]
    PortNotPublished { container: String, port: String },

    #[error("{addon} is already installed in namespace {namespace}")]
    AddonInstalled { addon: String, namespace: String },

    #[error("Docker network '{0}' not found")]
    NetworkNotFound(String),

    #[error("Incorrect IP address range: {0}")]
    InvalidAddressRange(String),

    #[error("Provided IP address range {range} not in cluster network {subnet}")]
    RangeNotInNetwork { range: String, subnet: String },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid metallb template: {0}")]
    InvalidTemplate(String),

    #[error("Repository path {0} does not exist")]
    RepoPathNotFound(PathBuf),

    #[error("Submodule '{0}' not found in the repository")]
    SubmoduleNotFound(String),

    #[error("Keys already exist in {0}, pass --force to overwrite")]
    KeysExist(PathBuf),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Archive has no '{0}' executable")]
    BinaryNotInArchive(String),

    #[error("Download failed for {url}: {message}")]
    Download { url: String, message: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse version: {0}")]
    Semver(#[from] semver::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
