//! `enabler setup ...`

use super::Command;
use crate::app::AppContext;
use async_trait::async_trait;
use clap::{Args, Subcommand};
use color_eyre::Result;
use enabler_core::provision::{HttpFetcher, Manifest, ProvisionStatus, Provisioner};
use enabler_core::{AddonInstaller, InstallOutcome};
use std::process::ExitCode;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct SetupArgs {
    #[command(subcommand)]
    pub action: SetupAction,
}

#[derive(Subcommand, Debug)]
pub enum SetupAction {
    /// Download binaries for all dependencies into bin/
    Init,
    /// Install and set up metallb
    Metallb {
        #[arg(long)]
        kube_context: Option<String>,
        /// Address range for metallb, e.g. "172.18.255.1 - 172.18.255.10".
        /// Defaults to the last 10 addresses of the kind network
        #[arg(long)]
        ip_addresspool: Option<String>,
        /// bitnami/metallb chart version [default: from settings, 4.6.0]
        #[arg(long)]
        version: Option<String>,
    },
    /// Install and set up istio
    Istio {
        #[arg(long)]
        kube_context: Option<String>,
        /// Also install grafana, kiali, prometheus and tracing
        #[arg(value_parser = ["monitoring-tools"])]
        monitoring_tools: Option<String>,
    },
}

pub struct SetupCommand(pub SetupArgs);

#[async_trait]
impl Command for SetupCommand {
    fn name(&self) -> &'static str {
        "setup"
    }

    async fn run(&self, ctx: &AppContext) -> Result<ExitCode> {
        match &self.0.action {
            SetupAction::Init => init(ctx).await,
            SetupAction::Metallb {
                kube_context,
                ip_addresspool,
                version,
            } => {
                let cluster = ctx.cluster(kube_context.as_deref())?;
                ctx.require_running(&cluster).await?;
                let settings = &ctx.settings.metallb;
                let version = version.as_deref().unwrap_or(&settings.version);
                let outcome = AddonInstaller::new(ctx.runner.as_ref())
                    .install_metallb(&cluster, settings, version, ip_addresspool.as_deref())
                    .await?;
                if let InstallOutcome::UnsupportedVersion(v) = outcome {
                    warn!("metallb {} was not installed", v);
                }
                Ok(ExitCode::SUCCESS)
            }
            SetupAction::Istio {
                kube_context,
                monitoring_tools,
            } => {
                let cluster = ctx.cluster(kube_context.as_deref())?;
                ctx.require_running(&cluster).await?;
                AddonInstaller::new(ctx.runner.as_ref())
                    .install_istio(&cluster, monitoring_tools.is_some())
                    .await?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

async fn init(ctx: &AppContext) -> Result<ExitCode> {
    let manifest = Manifest::load(ctx.settings.dependencies.as_deref())?;
    let fetcher = HttpFetcher::new()?;
    let provisioner = Provisioner::new(ctx.runner.as_ref(), &fetcher, ctx.settings.bin_dir.clone());

    let report = provisioner.provision_all(&manifest).await?;
    for (tool, status) in &report {
        println!("{tool}: {status}");
    }

    let bin_dir = std::fs::canonicalize(provisioner.bin_dir())?;
    info!("All dependencies downloaded to {}", bin_dir.display());
    info!(
        "IMPORTANT: Please add {} at the beginning of your PATH",
        bin_dir.display()
    );
    info!("$ echo export PATH={}:$PATH >> ~/.profile", bin_dir.display());
    info!("$ source ~/.profile");

    let failed = report
        .iter()
        .filter(|(_, status)| matches!(status, ProvisionStatus::Failed(_)))
        .count();
    if failed > 0 {
        warn!("{} dependencies could not be provisioned", failed);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
