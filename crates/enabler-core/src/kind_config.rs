//! Light validation of kind cluster config files
//!
//! kind does the real validation when it creates the cluster. This only
//! catches the mistakes worth a warning before a multi-minute create:
//! missing top-level fields and host ports something else already holds.

use crate::error::{CoreError, Result};
use std::net::TcpListener;
use std::path::Path;
use tracing::warn;

/// Top-level keys every kind config needs
const REQUIRED_KEYS: [&str; 3] = ["kind", "apiVersion", "nodes"];

/// Findings that do not stop cluster creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigReport {
    pub missing_keys: Vec<&'static str>,
    /// Declared `hostPort`s that are already bound on 127.0.0.1
    pub busy_ports: Vec<u16>,
}

impl ConfigReport {
    pub fn is_clean(&self) -> bool {
        self.missing_keys.is_empty() && self.busy_ports.is_empty()
    }
}

/// Check that `path` names an existing `.yaml`/`.yml` file, then report
/// missing keys and busy host ports as warnings.
pub fn validate_cluster_config(path: &Path) -> Result<ConfigReport> {
    let has_yaml_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "yaml" || e == "yml");
    if !has_yaml_extension || !path.is_file() {
        return Err(CoreError::ClusterConfigNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| CoreError::ClusterConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let missing_keys: Vec<&'static str> = REQUIRED_KEYS
        .into_iter()
        .filter(|key| doc.get(*key).is_none())
        .collect();
    match missing_keys.len() {
        0 => {}
        1 => warn!("Field {} missing in {}.", missing_keys[0], path.display()),
        _ => warn!(
            "Fields {} missing in {}.",
            missing_keys.join(","),
            path.display()
        ),
    }

    let busy_ports: Vec<u16> = host_ports(&doc)
        .into_iter()
        .filter(|port| !port_is_free(*port))
        .collect();
    for port in &busy_ports {
        // The port may be released before kind binds it, so only warn
        warn!(
            "Possible port conflict on hostPort: {} in {}.",
            port,
            path.display()
        );
    }

    Ok(ConfigReport {
        missing_keys,
        busy_ports,
    })
}

/// Every `nodes[].extraPortMappings[].hostPort`
fn host_ports(doc: &serde_yaml::Value) -> Vec<u16> {
    let Some(nodes) = doc.get("nodes").and_then(|n| n.as_sequence()) else {
        return Vec::new();
    };
    nodes
        .iter()
        .filter_map(|node| node.get("extraPortMappings"))
        .filter_map(|m| m.as_sequence())
        .flatten()
        .filter_map(|mapping| mapping.get("hostPort"))
        .filter_map(|p| p.as_u64())
        .filter_map(|p| u16::try_from(p).ok())
        .collect()
}

fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}
