//! Command handlers
//!
//! Every top-level command is one [`Command`]. The mapping from parsed
//! arguments to handler is the `match` in [`Commands::into_command`]; there
//! is no other registration.

pub mod apps;
pub mod kind;
pub mod platform;
pub mod preflight;
pub mod setup;
pub mod version;

use crate::Commands;
use crate::app::AppContext;
use async_trait::async_trait;
use color_eyre::Result;
use std::process::ExitCode;

/// Names of all top-level commands, in help order
pub const COMMAND_NAMES: [&str; 6] = ["kind", "setup", "platform", "apps", "version", "preflight"];

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &AppContext) -> Result<ExitCode>;
}

impl Commands {
    pub fn into_command(self) -> Box<dyn Command> {
        match self {
            Commands::Kind(args) => Box::new(kind::KindCommand(args)),
            Commands::Setup(args) => Box::new(setup::SetupCommand(args)),
            Commands::Platform(args) => Box::new(platform::PlatformCommand(args)),
            Commands::Apps(args) => Box::new(apps::AppsCommand(args)),
            Commands::Version => Box::new(version::VersionCommand),
            Commands::Preflight => Box::new(preflight::PreflightCommand),
        }
    }
}
