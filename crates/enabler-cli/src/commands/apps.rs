//! `enabler apps ...`

use super::Command;
use crate::app::AppContext;
use async_trait::async_trait;
use clap::{Args, Subcommand};
use color_eyre::Result;
use enabler_core::AddonInstaller;
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct AppsArgs {
    #[command(subcommand)]
    pub action: AppsAction,
}

#[derive(Subcommand, Debug)]
pub enum AppsAction {
    /// Create a namespace with istio sidecar injection
    Namespace {
        name: String,
        #[arg(long)]
        kube_context: Option<String>,
    },
}

pub struct AppsCommand(pub AppsArgs);

#[async_trait]
impl Command for AppsCommand {
    fn name(&self) -> &'static str {
        "apps"
    }

    async fn run(&self, ctx: &AppContext) -> Result<ExitCode> {
        match &self.0.action {
            AppsAction::Namespace { name, kube_context } => {
                let cluster = ctx.cluster(kube_context.as_deref())?;
                ctx.require_running(&cluster).await?;
                AddonInstaller::new(ctx.runner.as_ref())
                    .app_namespace(&cluster, name)
                    .await?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}
