//! enabler-rs: typed wrappers for the CLIs a local kind platform is built from
//!
//! Each wrapper borrows a [`CommandRunner`] and translates one tool's
//! subcommands into calls and its output into Rust values. Nothing here
//! decides *what* to run; that lives in `enabler-core`.

pub mod docker;
pub mod error;
pub mod helm;
pub mod istioctl;
pub mod kind;
pub mod kubectl;
pub mod runner;

pub use docker::{ContainerSummary, Docker};
pub use error::ToolError;
pub use helm::{Helm, InstallRequest};
pub use istioctl::Istioctl;
pub use kind::Kind;
pub use kubectl::Kubectl;
pub use runner::{CommandOutput, CommandRunner, SystemRunner, args, command_line};
