//! Settings file and kube context resolution

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Context used when nothing else names one
pub const DEFAULT_KUBE_CONTEXT: &str = "keitaro";

/// Settings file name looked up in the working directory
pub const LOCAL_SETTINGS_FILE: &str = "enabler.yaml";

/// Environment variable naming an explicit settings file
pub const SETTINGS_ENV: &str = "ENABLER_CONFIG";

/// Tool settings, loaded from YAML with camelCase keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Default kind cluster / kube context name
    pub kube_context: Option<String>,
    /// Where `setup init` puts downloaded binaries
    pub bin_dir: PathBuf,
    /// Dependency manifest overriding the built-in one
    pub dependencies: Option<PathBuf>,
    /// Where `platform keys` writes the key pair
    pub keys_dir: PathBuf,
    pub metallb: MetallbSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kube_context: Some(DEFAULT_KUBE_CONTEXT.to_string()),
            bin_dir: PathBuf::from("bin"),
            dependencies: None,
            keys_dir: PathBuf::from("infrastructure/keys"),
            metallb: MetallbSettings::default(),
        }
    }
}

/// metallb chart and template settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetallbSettings {
    /// Chart version installed when `--version` is not given
    pub version: String,
    pub namespace: String,
    pub release: String,
    pub repo_name: String,
    pub repo_url: String,
    /// Docker network whose subnet the address pool is carved from
    pub network: String,
    /// Config-map template for 3.x charts
    pub legacy_template: Option<PathBuf>,
    /// IPAddressPool template for 4.x charts and later
    pub crd_template: Option<PathBuf>,
}

impl Default for MetallbSettings {
    fn default() -> Self {
        Self {
            version: "4.6.0".to_string(),
            namespace: "metallb".to_string(),
            release: "metallb".to_string(),
            repo_name: "bitnami".to_string(),
            repo_url: "https://charts.bitnami.com/bitnami".to_string(),
            network: enabler_rs::kind::NETWORK_NAME.to_string(),
            legacy_template: None,
            crd_template: None,
        }
    }
}

impl MetallbSettings {
    /// Chart reference, e.g. `bitnami/metallb`
    pub fn chart(&self) -> String {
        format!("{}/metallb", self.repo_name)
    }
}

impl Settings {
    /// Load settings from the first source that exists:
    /// explicit path, `$ENABLER_CONFIG`, `./enabler.yaml`,
    /// `<config dir>/enabler/config.yaml`. Falls back to defaults.
    ///
    /// An explicitly named file that does not exist is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return Self::from_file(Path::new(&path));
        }
        let candidates = [
            Some(PathBuf::from(LOCAL_SETTINGS_FILE)),
            dirs_next::config_dir().map(|d| d.join("enabler").join("config.yaml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                tracing::debug!("Loading settings from {}", path.display());
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(CoreError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Pick the kube context for one command: the command's own flag wins over
/// the parent-level default.
pub fn resolve_kube_context(parent_default: Option<&str>, local: Option<&str>) -> Result<String> {
    local
        .or(parent_default)
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string)
        .ok_or(CoreError::ContextNotSpecified)
}
