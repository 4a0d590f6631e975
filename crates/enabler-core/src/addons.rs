//! Cluster add-ons: metallb, istio and application namespaces

use crate::config::MetallbSettings;
use crate::error::{CoreError, Result};
use crate::metallb::TemplateKind;
use crate::network::{cluster_subnet, select_pool};
use crate::types::InstallOutcome;
use enabler_rs::kind::context_name;
use enabler_rs::{CommandRunner, Helm, InstallRequest, Istioctl, Kubectl};
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const ISTIO_NAMESPACE: &str = "istio-system";
const ISTIOD_DEPLOYMENT: &str = "istiod";
const GRAFANA_VS: &str = include_str!("../templates/grafana-vs.yaml");

/// Label turning on sidecar injection for a namespace
pub const ISTIO_INJECTION_LABEL: &str = "istio-injection=enabled";

/// `istioctl manifest apply` overrides for the monitoring stack
const MONITORING_SETS: [&str; 6] = [
    "addonComponents.grafana.enabled=true",
    "addonComponents.kiali.enabled=true",
    "addonComponents.prometheus.enabled=true",
    "addonComponents.tracing.enabled=true",
    "values.kiali.dashboard.jaegerURL=http://jaeger-query:16686",
    "values.kiali.dashboard.grafanaURL=http://grafana:3000",
];

/// Write a rendered manifest to a temporary file that lives as long as the
/// returned handle.
fn manifest_file(prefix: &str, content: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Installs add-ons into a kind cluster
pub struct AddonInstaller<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> AddonInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Install metallb from the bitnami chart and give it an address pool
    /// from the cluster's docker network.
    ///
    /// `address_pool` is an `a - b` range; without one the last ten
    /// addresses of the network are used.
    pub async fn install_metallb(
        &self,
        cluster: &str,
        settings: &MetallbSettings,
        version: &str,
        address_pool: Option<&str>,
    ) -> Result<InstallOutcome> {
        let context = context_name(cluster);
        let helm = Helm::new(self.runner);
        let kubectl = Kubectl::new(self.runner);

        if helm
            .release_exists(&context, &settings.namespace, &settings.release)
            .await?
        {
            return Err(CoreError::AddonInstalled {
                addon: "metallb".to_string(),
                namespace: settings.namespace.clone(),
            });
        }

        helm.repo_add(&settings.repo_name, &settings.repo_url).await?;
        helm.repo_update().await?;

        let subnet = cluster_subnet(self.runner, &settings.network).await?;
        let pool = select_pool(&subnet, address_pool)?;
        info!("Setting up metallb with IP address range {}", pool);

        let Some(kind) = TemplateKind::for_version(version) else {
            info!(
                "metallb chart version {} is not supported, nothing installed. Use 3.x or 4.x and later",
                version
            );
            return Ok(InstallOutcome::UnsupportedVersion(version.to_string()));
        };
        let template_path = match kind {
            TemplateKind::Legacy => settings.legacy_template.as_deref(),
            TemplateKind::Crd => settings.crd_template.as_deref(),
        };
        let rendered = kind.render(&kind.load(template_path)?, &pool)?;
        let manifest = manifest_file("metallb-", &rendered)?;
        debug!("Rendered metallb config to {}", manifest.path().display());

        if kubectl.namespace_exists(&context, &settings.namespace).await? {
            info!(
                "Skipping creation of {} namespace since it already exists.",
                settings.namespace
            );
        } else {
            kubectl.create_namespace(&context, &settings.namespace).await?;
            info!("Created a namespace for metallb");
        }

        info!("Installing metallb on cluster, please wait...");
        let chart = settings.chart();
        let output = helm
            .install(&InstallRequest {
                release: &settings.release,
                chart: &chart,
                version,
                namespace: &settings.namespace,
                context: &context,
                values: &[],
                wait: true,
            })
            .await?;
        debug!("{}", output.trim());

        let output = kubectl.apply_file(&context, manifest.path()).await?;
        debug!("{}", output.trim());
        info!("metallb installed on cluster.");
        Ok(InstallOutcome::Installed)
    }

    /// Install istio with the default profile, optionally with the
    /// grafana / kiali / prometheus / tracing add-ons.
    pub async fn install_istio(&self, cluster: &str, monitoring: bool) -> Result<InstallOutcome> {
        let context = context_name(cluster);
        let kubectl = Kubectl::new(self.runner);

        if kubectl
            .deployment_exists(&context, ISTIO_NAMESPACE, ISTIOD_DEPLOYMENT)
            .await?
        {
            return Err(CoreError::AddonInstalled {
                addon: "istio".to_string(),
                namespace: ISTIO_NAMESPACE.to_string(),
            });
        }

        let istioctl = Istioctl::new(self.runner);
        let verify = istioctl.verify_install(&context).await?;
        info!("{}", verify.stderr.trim());

        info!("Installing istio, please wait...");
        let mut sets = vec!["profile=default".to_string()];
        if monitoring {
            sets.extend(MONITORING_SETS.iter().map(|s| s.to_string()));
        }
        let output = istioctl.manifest_apply(&context, &sets).await?;
        debug!("{}", output.trim());
        info!("Istio installed");

        if monitoring {
            if let Err(e) = self.expose_grafana(&context).await {
                warn!("Error setting grafana URL: {}", e);
            }
        }
        Ok(InstallOutcome::Installed)
    }

    async fn expose_grafana(&self, context: &str) -> Result<()> {
        let manifest = manifest_file("grafana-vs-", GRAFANA_VS)?;
        let output = Kubectl::new(self.runner)
            .apply_file(context, manifest.path())
            .await?;
        debug!("{}", output.trim());
        Ok(())
    }

    /// Create an application namespace with istio sidecar injection.
    /// Returns `false` when the namespace already existed.
    pub async fn app_namespace(&self, cluster: &str, name: &str) -> Result<bool> {
        let context = context_name(cluster);
        let kubectl = Kubectl::new(self.runner);

        if kubectl.namespace_exists(&context, name).await? {
            info!("Skipping creation of {} namespace since it already exists.", name);
            return Ok(false);
        }
        kubectl.create_namespace(&context, name).await?;
        info!("Created a namespace for {}", name);
        kubectl
            .label_namespace(&context, name, ISTIO_INJECTION_LABEL)
            .await?;
        info!("Labeled {} namespace for istio injection", name);
        Ok(true)
    }
}
