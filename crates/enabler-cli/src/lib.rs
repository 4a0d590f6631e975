//! enabler-cli: the `enabler` command line
//!
//! Parses arguments with clap, loads settings, and hands off to one
//! [`commands::Command`] per top-level command.

pub mod app;
pub mod commands;

pub use app::AppContext;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use enabler_core::Settings;
use std::path::PathBuf;
use std::process::ExitCode;

/// Enabler: local kind based Kubernetes platform for microservice apps
#[derive(Parser, Debug)]
#[command(name = "enabler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Default kind cluster for every command, overridden per command
    #[arg(long, env = "ENABLER_KUBE_CONTEXT")]
    pub kube_context: Option<String>,

    /// Path to the settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage kind clusters
    Kind(commands::kind::KindArgs),
    /// Install dependencies and cluster add-ons
    Setup(commands::setup::SetupArgs),
    /// Platform repository and access
    Platform(commands::platform::PlatformArgs),
    /// Application helpers
    Apps(commands::apps::AppsArgs),
    /// Print the enabler version
    Version,
    /// Check that the required tools are installed
    Preflight,
}

impl Cli {
    /// Load settings and run the selected command
    pub async fn run(self) -> Result<ExitCode> {
        let settings = Settings::load(self.config.as_deref())?;
        let ctx = AppContext::new(settings, self.kube_context);
        let command = self.command.into_command();
        tracing::debug!("Running command {}", command.name());
        command.run(&ctx).await
    }
}
