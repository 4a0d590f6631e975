//! `enabler version`

use super::Command;
use crate::app::AppContext;
use async_trait::async_trait;
use color_eyre::Result;
use std::process::ExitCode;

pub fn version_line() -> String {
    format!("Enabler {}", env!("CARGO_PKG_VERSION"))
}

pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    fn name(&self) -> &'static str {
        "version"
    }

    async fn run(&self, _ctx: &AppContext) -> Result<ExitCode> {
        println!("{}", version_line());
        Ok(ExitCode::SUCCESS)
    }
}
