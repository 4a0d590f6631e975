//! Dependency provisioning for `setup init`
//!
//! Downloads the platform's CLI tools into `bin/`. Which tools, where from
//! and at which version comes from a dependency manifest:
//!
//! ```yaml
//! helm:
//!   url: https://get.helm.sh/helm-v{version}-{os}-{arch}.tar.gz
//!   version: 3.14.2
//!   format: tar.gz
//!   latest: https://api.github.com/repos/helm/helm/releases/latest
//!   update: true
//! ```
//!
//! Every download is kept in `bin/.cache` under `<tool>-v<version>-...`,
//! which is also where the installed version is read back from.

use crate::error::{CoreError, Result};
use async_trait::async_trait;
use enabler_rs::CommandRunner;
use flate2::read::GzDecoder;
use regex::Regex;
use semver::Version;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, error, info, warn};

const BUILTIN_MANIFEST: &str = include_str!("../templates/dependencies.yaml");

/// Manifest file looked up in the working directory
pub const MANIFEST_FILE: &str = "dependencies.yaml";

const CACHE_DIR: &str = ".cache";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap_or_else(|e| panic!("invalid version regex: {e}"))
});

/// How a tool is shipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ArchiveFormat {
    /// A single executable
    #[serde(rename = "binary")]
    Binary,
    /// Gzipped tarball holding an executable named after the tool
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl ArchiveFormat {
    fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Binary => "",
            ArchiveFormat::TarGz => ".tar.gz",
        }
    }
}

fn default_version_args() -> Vec<String> {
    vec!["version".to_string()]
}

/// One manifest entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Download URL with `{os}`, `{arch}` and `{version}` placeholders
    pub url: String,
    /// Version installed on first download
    pub version: String,
    pub format: ArchiveFormat,
    /// GitHub latest-release API URL
    pub latest: Option<String>,
    /// Replace an installed binary when a newer release exists
    #[serde(default)]
    pub update: bool,
    /// Arguments that make the binary print its version
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
}

impl Dependency {
    pub fn url_for(&self, version: &str, platform: &Platform) -> String {
        self.url
            .replace("{os}", &platform.os)
            .replace("{arch}", &platform.arch)
            .replace("{version}", version)
    }
}

/// Tool name to download instructions
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Manifest(pub BTreeMap<String, Dependency>);

impl Manifest {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_MANIFEST)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// The configured manifest, else `./dependencies.yaml`, else the
    /// built-in one
    pub fn load(configured: Option<&Path>) -> Result<Self> {
        if let Some(path) = configured {
            if !path.is_file() {
                return Err(CoreError::ConfigNotFound(path.to_path_buf()));
            }
            return Self::from_yaml(&std::fs::read_to_string(path)?);
        }
        let local = Path::new(MANIFEST_FILE);
        if local.is_file() {
            debug!("Using dependency manifest {}", local.display());
            return Self::from_yaml(&std::fs::read_to_string(local)?);
        }
        Self::builtin()
    }
}

/// OS and architecture as they appear in download URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn current() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self {
            os: std::env::consts::OS.to_string(),
            arch: arch.to_string(),
        }
    }
}

/// Download access, separated out so tests run offline
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
    /// `tag_name` of a GitHub latest-release document
    async fn latest_tag(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Fetcher backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("enabler/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status().map_err(|e| CoreError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn latest_tag(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let release: Release = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(release.tag_name)
    }
}

/// What happened to one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStatus {
    Downloaded { version: String },
    Updated { from: Version, to: Version },
    UpToDate { version: Version },
    /// Installed and not checked for updates
    Present,
    Failed(String),
}

impl fmt::Display for ProvisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStatus::Downloaded { version } => write!(f, "downloaded {version}"),
            ProvisionStatus::Updated { from, to } => write!(f, "updated {from} -> {to}"),
            ProvisionStatus::UpToDate { version } => write!(f, "up to date ({version})"),
            ProvisionStatus::Present => write!(f, "already present"),
            ProvisionStatus::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// First `x.y.z` in free text
pub fn extract_version(text: &str) -> Option<Version> {
    let caps = VERSION_RE.captures(text)?;
    Some(Version::new(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// Version from a cached download name: `<tool>-v<x.y.z>...` or
/// `<tool>-<x.y.z>...`
pub fn version_from_filename(tool: &str, filename: &str) -> Option<Version> {
    let rest = filename.strip_prefix(tool)?.strip_prefix('-')?;
    let rest = rest.strip_prefix('v').unwrap_or(rest);
    if !rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    extract_version(rest)
}

/// Version from a release tag such as `v3.14.2` or `1.21.0`
pub fn version_from_tag(tag: &str) -> Option<Version> {
    Version::parse(tag.trim().trim_start_matches('v')).ok()
}

pub fn needs_update(current: &Version, latest: &Version) -> bool {
    current < latest
}

/// Installs tools into a bin directory
pub struct Provisioner<'a> {
    runner: &'a dyn CommandRunner,
    fetcher: &'a dyn Fetcher,
    bin_dir: PathBuf,
    platform: Platform,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        fetcher: &'a dyn Fetcher,
        bin_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            fetcher,
            bin_dir: bin_dir.into(),
            platform: Platform::current(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    fn cache_dir(&self) -> PathBuf {
        self.bin_dir.join(CACHE_DIR)
    }

    /// Provision every tool in the manifest. One tool failing does not
    /// stop the others.
    pub async fn provision_all(&self, manifest: &Manifest) -> Result<Vec<(String, ProvisionStatus)>> {
        std::fs::create_dir_all(self.cache_dir())?;
        let mut report = Vec::with_capacity(manifest.0.len());
        for (tool, dependency) in &manifest.0 {
            let status = match self.provision(tool, dependency).await {
                Ok(status) => status,
                Err(e) => {
                    error!("Failed to provision {}: {}", tool, e);
                    ProvisionStatus::Failed(e.to_string())
                }
            };
            report.push((tool.clone(), status));
        }
        Ok(report)
    }

    pub async fn provision(&self, tool: &str, dependency: &Dependency) -> Result<ProvisionStatus> {
        let location = self.bin_dir.join(tool);
        if !location.exists() {
            info!("Downloading {}...", tool);
            self.install(tool, dependency, &dependency.version).await?;
            info!("{} downloaded and made executable!", tool);
            return Ok(ProvisionStatus::Downloaded {
                version: dependency.version.clone(),
            });
        }

        info!("{} already exists at: {}", tool, location.display());
        let (true, Some(latest_url)) = (dependency.update, dependency.latest.as_deref()) else {
            return Ok(ProvisionStatus::Present);
        };

        let latest = match self.fetcher.latest_tag(latest_url).await {
            Ok(tag) => match version_from_tag(&tag) {
                Some(version) => version,
                None => {
                    warn!("Latest release tag {} of {} is not a version", tag, tool);
                    return Ok(ProvisionStatus::Present);
                }
            },
            Err(e) => {
                warn!("Latest release of {} not found: {}", tool, e);
                return Ok(ProvisionStatus::Present);
            }
        };

        let Some(current) = self.current_version(tool, dependency).await else {
            warn!("Couldn't determine the installed version of {}", tool);
            return Ok(ProvisionStatus::Present);
        };

        if !needs_update(&current, &latest) {
            debug!("{} {} is up to date", tool, current);
            return Ok(ProvisionStatus::UpToDate { version: current });
        }

        info!("Updating {} from {} to {}...", tool, current, latest);
        self.install(tool, dependency, &latest.to_string()).await?;
        info!("{} updated!", tool);
        Ok(ProvisionStatus::Updated {
            from: current,
            to: latest,
        })
    }

    /// Installed version: newest cached download first, the binary's own
    /// version output second
    pub async fn current_version(&self, tool: &str, dependency: &Dependency) -> Option<Version> {
        if let Some(version) = self.cached_version(tool) {
            return Some(version);
        }
        let binary = self.bin_dir.join(tool);
        let output = self
            .runner
            .output(&binary.to_string_lossy(), &dependency.version_args)
            .await
            .ok()?;
        extract_version(&output.stdout).or_else(|| extract_version(&output.stderr))
    }

    fn cached_version(&self, tool: &str) -> Option<Version> {
        let entries = std::fs::read_dir(self.cache_dir()).ok()?;
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let version = version_from_filename(tool, &entry.file_name().to_string_lossy())?;
                let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, version))
            })
            .max()
            .map(|(_, version)| version)
    }

    async fn install(&self, tool: &str, dependency: &Dependency, version: &str) -> Result<()> {
        let url = dependency.url_for(version, &self.platform);
        let bytes = self.fetcher.fetch(&url).await?;

        std::fs::create_dir_all(self.cache_dir())?;
        let cached = self.cache_dir().join(format!(
            "{tool}-v{version}-{}-{}{}",
            self.platform.os,
            self.platform.arch,
            dependency.format.extension()
        ));
        std::fs::write(&cached, &bytes)?;
        debug!("Cached {} as {}", url, cached.display());

        match dependency.format {
            ArchiveFormat::Binary => {
                let destination = self.bin_dir.join(tool);
                std::fs::write(&destination, &bytes)?;
                make_executable(&destination)?;
            }
            ArchiveFormat::TarGz => {
                extract_binary(&bytes, tool, &self.bin_dir)?;
            }
        }
        Ok(())
    }
}

/// Unpack the entry named `tool` from a `.tar.gz` into `dir`, wherever it
/// sits inside the archive. Everything else is skipped.
fn extract_binary(bytes: &[u8], tool: &str, dir: &Path) -> Result<PathBuf> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if entry.path()?.file_name().is_none_or(|name| name != tool) {
            continue;
        }
        let destination = dir.join(tool);
        entry.unpack(&destination)?;
        make_executable(&destination)?;
        return Ok(destination);
    }
    Err(CoreError::BinaryNotInArchive(tool.to_string()))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
