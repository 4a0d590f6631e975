//! `enabler kind ...`

use super::Command;
use crate::app::AppContext;
use async_trait::async_trait;
use clap::{Args, Subcommand};
use color_eyre::Result;
use enabler_core::{ClusterController, ClusterState, CoreError, StartOutcome, ToolInspector};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Args, Debug)]
pub struct KindArgs {
    #[command(subcommand)]
    pub action: KindAction,
}

#[derive(Subcommand, Debug)]
pub enum KindAction {
    /// Create a kind cluster
    Create {
        /// kind cluster config
        #[arg(default_value = "kind-cluster.yaml")]
        configfile: PathBuf,
        /// Cluster to create
        #[arg(long)]
        kube_context: Option<String>,
    },
    /// Delete a kind cluster
    Delete {
        #[arg(long)]
        kube_context: Option<String>,
    },
    /// Check whether a kind cluster exists and answers
    Status {
        #[arg(long)]
        kube_context: Option<String>,
    },
    /// Start a stopped kind cluster
    Start {
        #[arg(long)]
        kube_context: Option<String>,
    },
    /// Stop a running kind cluster
    Stop {
        #[arg(long)]
        kube_context: Option<String>,
    },
}

impl KindAction {
    pub fn kube_context(&self) -> Option<&str> {
        match self {
            KindAction::Create { kube_context, .. }
            | KindAction::Delete { kube_context }
            | KindAction::Status { kube_context }
            | KindAction::Start { kube_context }
            | KindAction::Stop { kube_context } => kube_context.as_deref(),
        }
    }
}

pub struct KindCommand(pub KindArgs);

#[async_trait]
impl Command for KindCommand {
    fn name(&self) -> &'static str {
        "kind"
    }

    async fn run(&self, ctx: &AppContext) -> Result<ExitCode> {
        let action = &self.0.action;
        let cluster = ctx.cluster(action.kube_context())?;
        let inspector = ToolInspector::new(ctx.runner.as_ref());
        let controller =
            ClusterController::new(ctx.runner.as_ref(), &inspector, ctx.sleeper.as_ref());

        match action {
            KindAction::Create { configfile, .. } => {
                controller.create(&cluster, configfile).await?;
            }
            KindAction::Delete { .. } => controller.delete(&cluster).await?,
            KindAction::Status { .. } => {
                let state = controller.status(&cluster).await?;
                println!("{} Kind cluster '{}': {}", state.symbol(), cluster, state);
                if state == ClusterState::Stopped {
                    return Err(CoreError::ClusterNotRunning(cluster).into());
                }
            }
            KindAction::Start { .. } => match controller.start(&cluster).await? {
                StartOutcome::AlreadyRunning => {}
                StartOutcome::Started { attempts } => {
                    info!("Cluster answered after {} check(s)", attempts)
                }
            },
            KindAction::Stop { .. } => {
                let report = controller.stop(&cluster).await?;
                info!(
                    "Stopped {} container(s), {} already stopped",
                    report.stopped.len(),
                    report.already_stopped.len()
                );
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fake::FakeRunner;
    use enabler_core::Settings;
    use enabler_core::Sleeper;
    use enabler_rs::CommandOutput;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSleeper(AtomicU32);

    #[async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, _duration: Duration) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stopped_cluster() -> Arc<FakeRunner> {
        Arc::new(
            FakeRunner::default()
                .on("kind get clusters", CommandOutput::ok("keitaro\n"))
                .on("kubectl cluster-info", CommandOutput::failed(1, "connection refused"))
                .on(
                    "docker ps",
                    CommandOutput::ok(r#"{"ID":"cp1","Names":"keitaro-control-plane","State":"exited"}"#),
                )
                .on(
                    "docker inspect",
                    CommandOutput::ok(r#"{"6443/tcp":[{"HostIp":"127.0.0.1","HostPort":"36789"}]}"#),
                ),
        )
    }

    fn context(runner: Arc<FakeRunner>) -> AppContext {
        AppContext::with_runner(Settings::default(), None, runner)
    }

    #[tokio::test]
    async fn test_status_of_absent_cluster_succeeds() {
        let runner = Arc::new(FakeRunner::default().on("kind get clusters", CommandOutput::ok("other\n")));
        let command = KindCommand(KindArgs {
            action: KindAction::Status { kube_context: None },
        });

        command.run(&context(runner.clone())).await.unwrap();

        assert_eq!(runner.calls(), vec!["kind get clusters"]);
    }

    #[tokio::test]
    async fn test_status_of_stopped_cluster_fails() {
        let command = KindCommand(KindArgs {
            action: KindAction::Status { kube_context: None },
        });

        let err = command.run(&context(stopped_cluster())).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Kind cluster 'keitaro' is not running. Please start the cluster"
        );
    }

    #[tokio::test]
    async fn test_start_gives_up_when_cluster_never_answers() {
        let runner = stopped_cluster();
        let sleeper = Arc::new(CountingSleeper::default());
        let ctx = context(runner.clone()).with_sleeper(sleeper.clone());
        let command = KindCommand(KindArgs {
            action: KindAction::Start { kube_context: None },
        });

        let err = command.run(&ctx).await.unwrap_err();

        assert!(err.to_string().contains("not reachable after 10 attempts"));
        assert_eq!(sleeper.0.load(Ordering::SeqCst), 9);
        assert!(runner.calls().contains(&"docker start cp1".to_string()));
    }

    #[tokio::test]
    async fn test_delete_uses_local_context() {
        let runner = Arc::new(FakeRunner::default().on("kind get clusters", CommandOutput::ok("dev\n")));
        let command = KindCommand(KindArgs {
            action: KindAction::Delete {
                kube_context: Some("dev".to_string()),
            },
        });

        command.run(&context(runner.clone())).await.unwrap();

        assert_eq!(
            runner.calls(),
            vec!["kind get clusters", "kind delete cluster --name dev"]
        );
    }

    #[tokio::test]
    async fn test_create_with_missing_config_fails() {
        let runner = Arc::new(FakeRunner::default());
        let command = KindCommand(KindArgs {
            action: KindAction::Create {
                configfile: PathBuf::from("/nonexistent/kind-cluster.yaml"),
                kube_context: None,
            },
        });

        let err = command.run(&context(runner.clone())).await.unwrap_err();
        assert!(err.to_string().contains("Cluster config file not found"));
        assert!(runner.calls().is_empty());
    }
}
