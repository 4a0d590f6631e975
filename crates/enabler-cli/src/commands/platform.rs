//! `enabler platform ...`

use super::Command;
use crate::app::AppContext;
use async_trait::async_trait;
use clap::{Args, Subcommand};
use color_eyre::Result;
use enabler_core::git::{self, HeadState, Selection, SubmoduleReport, SubmoduleState};
use enabler_core::keys::{DEFAULT_KEY_BITS, generate_keys};
use enabler_rs::Kubectl;
use enabler_rs::kind::context_name;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

const INGRESS_NAMESPACE: &str = "istio-system";
const INGRESS_SERVICE: &str = "istio-ingressgateway";

#[derive(Args, Debug)]
pub struct PlatformArgs {
    #[command(subcommand)]
    pub action: PlatformAction,
}

#[derive(Subcommand, Debug)]
pub enum PlatformAction {
    /// Initialize the platform's git submodules
    Init {
        /// `all` or a comma separated list of submodule names
        #[arg(default_value = "all")]
        submodules: String,
        #[arg(default_value = ".")]
        repopath: PathBuf,
    },
    /// Show how to reach the platform
    Info {
        #[arg(long)]
        kube_context: Option<String>,
    },
    /// Generate the platform's RSA key pair
    Keys {
        #[arg(default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,
        /// Replace an existing key pair
        #[arg(long)]
        force: bool,
    },
    /// Tag the platform and one submodule with a release version
    Release {
        version: String,
        submodule_path: PathBuf,
    },
    /// Report the checked out version of each submodule
    Version {
        #[arg(default_value = "all")]
        submodules: String,
        #[arg(default_value = ".")]
        repopath: PathBuf,
    },
}

pub struct PlatformCommand(pub PlatformArgs);

#[async_trait]
impl Command for PlatformCommand {
    fn name(&self) -> &'static str {
        "platform"
    }

    async fn run(&self, ctx: &AppContext) -> Result<ExitCode> {
        match &self.0.action {
            PlatformAction::Init {
                submodules,
                repopath,
            } => {
                let failures = git::init_submodules(repopath, &Selection::parse(submodules))?;
                if !failures.is_empty() {
                    for (name, reason) in &failures {
                        warn!("{}: {}", name, reason);
                    }
                    return Ok(ExitCode::FAILURE);
                }
                info!("Platform initialized.");
            }
            PlatformAction::Info { kube_context } => {
                let cluster = ctx.cluster(kube_context.as_deref())?;
                ctx.require_running(&cluster).await?;
                let context = context_name(&cluster);
                let kubectl = Kubectl::new(ctx.runner.as_ref());

                match kubectl
                    .load_balancer_ip(&context, INGRESS_NAMESPACE, INGRESS_SERVICE)
                    .await?
                {
                    Some(ip) => println!("Platform can be accessed through the URL:\nhttp://{ip}"),
                    None => warn!("{} has no load balancer address yet", INGRESS_SERVICE),
                }
                println!("{}", kubectl.cluster_info(&context).await?.trim());
            }
            PlatformAction::Keys { bits, force } => {
                let pair = generate_keys(&ctx.settings.keys_dir, *bits, *force)?;
                println!("{}", pair.private_key.display());
                println!("{}", pair.public_key.display());
            }
            PlatformAction::Release {
                version,
                submodule_path,
            } => {
                let tags = git::release(&std::env::current_dir()?, version, submodule_path)?;
                println!("Platform version: {}", tags.platform);
                println!("{} at {}", tags.submodule, tags.submodule_sha);
            }
            PlatformAction::Version {
                submodules,
                repopath,
            } => {
                let reports = git::version_report(repopath, &Selection::parse(submodules), true)?;
                for report in &reports {
                    println!("{}", render_report(report));
                }
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn render_report(report: &SubmoduleReport) -> String {
    match &report.state {
        SubmoduleState::NotPresent => format!("{}: not present", report.name),
        SubmoduleState::Error(e) => format!("{}: error retrieving version: {}", report.name, e),
        SubmoduleState::Present(status) => {
            let mut line = match &status.head {
                HeadState::Branch(_) => format!("{}: {} ({})", report.name, status.head, status.head_sha),
                // the label already carries the SHA
                HeadState::Detached(_) => format!("{}: {}", report.name, status.head),
            };
            if !status.tags_at_head.is_empty() {
                line.push_str(&format!(" tags: {}", status.tags_at_head.join(",")));
            }
            if let Some(tag) = &status.latest_tag {
                line.push_str(&format!(
                    " latest: {} ({})",
                    tag.name,
                    tag.committed.format("%Y-%m-%d")
                ));
            }
            if let Some(d) = status.divergence {
                line.push_str(&format!(" ahead {} behind {}", d.ahead, d.behind));
            }
            line
        }
    }
}
