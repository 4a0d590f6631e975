//! Preflight checks for the tools the platform needs

use crate::provision::extract_version;
use enabler_rs::{CommandRunner, ToolError};
use semver::Version;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Which output stream carries the version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Minimum version and how to find the installed one
#[derive(Clone, Copy)]
struct Requirement {
    minimum: (u64, u64),
    stream: Stream,
    parse: fn(&str) -> Option<Version>,
}

/// One tool to check
#[derive(Clone, Copy)]
pub struct ToolCheck {
    pub name: &'static str,
    pub program: &'static str,
    pub args: &'static [&'static str],
    requirement: Option<Requirement>,
    /// Extra hint logged when the tool runs but fails
    hint: Option<&'static str>,
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Satisfied,
    NotFound,
    /// Non-zero exit, with stderr
    Failed(String),
    VersionMismatch { found: Version, required: String },
    /// Version output that could not be understood
    Unparseable(String),
}

impl CheckOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, CheckOutcome::Satisfied)
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Satisfied => write!(f, "ok"),
            CheckOutcome::NotFound => write!(f, "not found in PATH"),
            CheckOutcome::Failed(stderr) => write!(f, "failed: {stderr}"),
            CheckOutcome::VersionMismatch { found, required } => {
                write!(f, "version {found} found, {required} or later needed")
            }
            CheckOutcome::Unparseable(output) => write!(f, "unrecognised version output: {output}"),
        }
    }
}

/// Java major version from `java -version`. Legacy `1.x` numbering maps
/// to `x`, so `1.8.0_292` is 8.
pub fn java_version(output: &str) -> Option<Version> {
    let mut tokens = output.split_whitespace();
    tokens.find(|t| *t == "version")?;
    let raw = tokens.next()?.trim_matches('"');
    let mut parts = raw.split(['.', '_', '-', '+']);
    let first: u64 = parts.next()?.parse().ok()?;
    let major = if first == 1 {
        parts.next()?.parse().ok()?
    } else {
        first
    };
    Some(Version::new(major, 0, 0))
}

/// The fixed list of checks, in the order they run
pub fn checks() -> Vec<ToolCheck> {
    vec![
        ToolCheck {
            name: "java jdk",
            program: "java",
            args: &["-version"],
            requirement: Some(Requirement {
                minimum: (11, 0),
                stream: Stream::Stderr,
                parse: java_version,
            }),
            hint: None,
        },
        ToolCheck {
            name: "docker",
            program: "docker",
            args: &["ps"],
            requirement: None,
            hint: Some(
                "Please ensure the docker daemon is running and that your user is part of the docker group",
            ),
        },
        ToolCheck {
            name: "helm",
            program: "helm",
            args: &["version", "--short"],
            requirement: Some(Requirement {
                minimum: (3, 0),
                stream: Stream::Stdout,
                parse: extract_version,
            }),
            hint: None,
        },
        ToolCheck {
            name: "kind",
            program: "kind",
            args: &["version"],
            requirement: None,
            hint: None,
        },
        ToolCheck {
            name: "skaffold",
            program: "skaffold",
            args: &["version"],
            requirement: None,
            hint: None,
        },
        ToolCheck {
            name: "kubectl",
            program: "kubectl",
            args: &["version", "--client=true"],
            requirement: None,
            hint: None,
        },
        ToolCheck {
            name: "istioctl",
            program: "istioctl",
            args: &["version", "-s", "--remote=false"],
            requirement: Some(Requirement {
                minimum: (1, 5),
                stream: Stream::Stdout,
                parse: extract_version,
            }),
            hint: None,
        },
    ]
}

impl ToolCheck {
    pub async fn run(&self, runner: &dyn CommandRunner) -> CheckOutcome {
        let argv: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        let output = match runner.output(self.program, &argv).await {
            Ok(output) => output,
            Err(ToolError::NotFound { .. }) => return CheckOutcome::NotFound,
            Err(e) => return CheckOutcome::Failed(e.to_string()),
        };
        if !output.success() {
            return CheckOutcome::Failed(output.stderr.trim().to_string());
        }
        debug!("{}", output.stdout.trim());

        let Some(requirement) = self.requirement else {
            return CheckOutcome::Satisfied;
        };
        let text = match requirement.stream {
            Stream::Stdout => &output.stdout,
            Stream::Stderr => &output.stderr,
        };
        let Some(found) = (requirement.parse)(text) else {
            return CheckOutcome::Unparseable(text.trim().to_string());
        };
        let (major, minor) = requirement.minimum;
        if (found.major, found.minor) < (major, minor) {
            return CheckOutcome::VersionMismatch {
                found,
                required: format!("{major}.{minor}"),
            };
        }
        CheckOutcome::Satisfied
    }

    fn log(&self, outcome: &CheckOutcome) {
        match outcome {
            CheckOutcome::Satisfied => info!("✓ {}", self.name),
            CheckOutcome::NotFound => error!("{} not found in PATH.", self.program),
            CheckOutcome::Failed(stderr) => {
                error!("{} returned something unexpected: {}", self.program, stderr);
                if let Some(hint) = self.hint {
                    error!("{}", hint);
                }
            }
            CheckOutcome::VersionMismatch { .. } | CheckOutcome::Unparseable(_) => {
                warn!("{}: {}", self.name, outcome)
            }
        }
    }
}

/// Run every check. A failing check never stops the others.
pub async fn run_preflight(runner: &dyn CommandRunner) -> Vec<(&'static str, CheckOutcome)> {
    let mut results = Vec::new();
    for check in checks() {
        let outcome = check.run(runner).await;
        check.log(&outcome);
        results.push((check.name, outcome));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use enabler_rs::CommandOutput;

    fn stderr_only(stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_java_version_parsing() {
        assert_eq!(
            java_version("openjdk version \"11.0.2\" 2019-01-15\nOpenJDK Runtime Environment"),
            Some(Version::new(11, 0, 0))
        );
        assert_eq!(
            java_version("java version \"1.8.0_292\"\nJava(TM) SE Runtime Environment"),
            Some(Version::new(8, 0, 0))
        );
        assert_eq!(
            java_version("openjdk version \"17\" 2021-09-14"),
            Some(Version::new(17, 0, 0))
        );
        assert_eq!(java_version("garbage"), None);
    }

    #[test]
    fn test_helm_and_istioctl_versions() {
        assert_eq!(extract_version("v3.14.2+gc309b6f\n"), Some(Version::new(3, 14, 2)));
        assert_eq!(extract_version("1.21.0\n"), Some(Version::new(1, 21, 0)));
    }

    #[tokio::test]
    async fn test_all_satisfied() {
        let runner = ScriptedRunner::new()
            .on("java", stderr_only("openjdk version \"17.0.2\" 2022-01-18"))
            .on("helm version", CommandOutput::ok("v3.14.2+gc309b6f"))
            .on("istioctl version", CommandOutput::ok("1.21.0"));

        let results = run_preflight(&runner).await;

        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|(_, o)| o.is_satisfied()), "{results:?}");
        assert!(runner.calls().contains(&"kubectl version --client=true".to_string()));
        assert!(runner.calls().contains(&"istioctl version -s --remote=false".to_string()));
    }

    #[tokio::test]
    async fn test_individual_failures_do_not_stop_the_run() {
        let runner = ScriptedRunner::new()
            .on("java", stderr_only("java version \"1.8.0_292\""))
            .missing("docker")
            .on("helm version", CommandOutput::ok("v2.16.1+gbbdfe5e"))
            .on("kind", CommandOutput::failed(1, "segfault"))
            .on("istioctl version", CommandOutput::ok("unknown"));

        let results = run_preflight(&runner).await;

        assert_eq!(results.len(), 7);
        assert!(matches!(results[0].1, CheckOutcome::VersionMismatch { .. }));
        assert_eq!(results[1].1, CheckOutcome::NotFound);
        assert!(matches!(results[2].1, CheckOutcome::VersionMismatch { .. }));
        assert_eq!(results[3].1, CheckOutcome::Failed("segfault".to_string()));
        assert!(results[4].1.is_satisfied());
        assert!(results[5].1.is_satisfied());
        assert!(matches!(results[6].1, CheckOutcome::Unparseable(_)));
    }

    #[tokio::test]
    async fn test_old_istioctl() {
        let runner = ScriptedRunner::new().on("istioctl", CommandOutput::ok("1.4.6"));
        let istioctl = checks().into_iter().find(|c| c.program == "istioctl").unwrap();

        let outcome = istioctl.run(&runner).await;
        assert_eq!(
            outcome,
            CheckOutcome::VersionMismatch {
                found: Version::new(1, 4, 6),
                required: "1.5".to_string()
            }
        );
    }
}
