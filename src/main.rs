//! enabler: set up a local kind based Kubernetes platform

use clap::Parser;
use color_eyre::Result;
use enabler_cli::Cli;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::{EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    color_eyre::install()?;

    // Quiet down the HTTP stack used for dependency downloads
    let filter = if cli.debug {
        EnvFilter::from_default_env()
            .add_directive(Level::DEBUG.into())
            .add_directive("h2=info".parse()?)
            .add_directive("hyper=info".parse()?)
            .add_directive("hyper_util=info".parse()?)
            .add_directive("reqwest=info".parse()?)
            .add_directive("rustls=info".parse()?)
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    match open_log_file(cli.log_file.clone())? {
        Some(file) => tracing_subscriber::registry()
            .with(fmt_layer.with_writer(file).with_ansi(false))
            .with(filter)
            .init(),
        None => tracing_subscriber::registry()
            .with(fmt_layer.with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }

    match cli.run().await {
        Ok(code) => Ok(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Log to the given file, or stderr when none is set
fn open_log_file(log_file: Option<PathBuf>) -> std::io::Result<Option<File>> {
    log_file.map(File::create).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_log_file_means_stderr() {
        assert!(open_log_file(None).unwrap().is_none());
    }

    #[test]
    fn explicit_log_file_is_created() {
        let path = std::env::temp_dir().join(format!("enabler-{}.log", std::process::id()));
        let file = open_log_file(Some(path.clone())).unwrap();
        assert!(file.is_some());
        assert!(path.exists());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_log_directory_is_an_error() {
        let path = PathBuf::from("/nonexistent-enabler-dir/enabler.log");
        assert!(open_log_file(Some(path)).is_err());
    }
}
