//! State shared by every command handler

use enabler_core::{
    ClusterController, ClusterState, CoreError, Settings, Sleeper, TokioSleeper, ToolInspector,
    resolve_kube_context,
};
use enabler_rs::{CommandRunner, SystemRunner};
use std::sync::Arc;

/// Settings, the global kube context and the process seams
pub struct AppContext {
    pub settings: Settings,
    /// `--kube-context` given before the command name
    pub kube_context: Option<String>,
    pub runner: Arc<dyn CommandRunner>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl AppContext {
    /// Real processes, preferring binaries installed by `setup init`
    pub fn new(settings: Settings, kube_context: Option<String>) -> Self {
        let runner = Arc::new(SystemRunner::with_bin_dir(settings.bin_dir.clone()));
        Self::with_runner(settings, kube_context, runner)
    }

    pub fn with_runner(
        settings: Settings,
        kube_context: Option<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            settings,
            kube_context,
            runner,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Cluster a command acts on: its own `--kube-context`, then the
    /// global one, then the settings file
    pub fn cluster(&self, local: Option<&str>) -> Result<String, CoreError> {
        let parent = self
            .kube_context
            .as_deref()
            .or(self.settings.kube_context.as_deref());
        resolve_kube_context(parent, local)
    }

    /// Fail unless the cluster exists and answers
    pub async fn require_running(&self, cluster: &str) -> Result<(), CoreError> {
        let inspector = ToolInspector::new(self.runner.as_ref());
        let controller =
            ClusterController::new(self.runner.as_ref(), &inspector, self.sleeper.as_ref());
        match controller.status(cluster).await? {
            ClusterState::Running => Ok(()),
            ClusterState::Stopped => Err(CoreError::ClusterNotRunning(cluster.to_string())),
            ClusterState::Absent => Err(CoreError::ClusterNotFound(cluster.to_string())),
        }
    }
}
