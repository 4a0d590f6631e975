//! `enabler preflight`

use super::Command;
use crate::app::AppContext;
use async_trait::async_trait;
use color_eyre::Result;
use enabler_core::preflight::run_preflight;
use std::process::ExitCode;

pub struct PreflightCommand;

#[async_trait]
impl Command for PreflightCommand {
    fn name(&self) -> &'static str {
        "preflight"
    }

    /// Individual checks are only reported; the command itself succeeds
    async fn run(&self, ctx: &AppContext) -> Result<ExitCode> {
        let results = run_preflight(ctx.runner.as_ref()).await;
        let passed = results.iter().filter(|(_, o)| o.is_satisfied()).count();
        tracing::info!("{}/{} checks passed", passed, results.len());
        Ok(ExitCode::SUCCESS)
    }
}
