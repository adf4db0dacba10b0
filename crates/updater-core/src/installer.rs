//! Installer collaborators.
//!
//! The engine hands a batch of `full_name → version` pairs to an
//! [`Installer`] once per cycle and only looks at success or failure.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

/// What the installer reported for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallStatus {
    Installed,
    Failed { reason: String },
}

impl InstallStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallStatus::Installed)
    }
}

/// External package installer / dependency resolver.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install every `full_name → version` pair as one request.
    async fn install(&self, packages: &BTreeMap<String, String>, strict: bool) -> InstallStatus;
}

/// Logs the batch and reports success without touching anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunInstaller;

#[async_trait]
impl Installer for DryRunInstaller {
    async fn install(&self, packages: &BTreeMap<String, String>, strict: bool) -> InstallStatus {
        for (name, version) in packages {
            info!(package = %name, version = %version, strict, "dry run: would install");
        }
        InstallStatus::Installed
    }
}

/// Runs an external package manager command for each batch.
///
/// Invocation: `<program> <args...> [--strict] <name>@<version>...`
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Build from a whitespace-separated command line, e.g. `"npm install"`.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout: None,
        })
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Full argument list for one batch.
    pub fn command_args(&self, packages: &BTreeMap<String, String>, strict: bool) -> Vec<String> {
        let mut args = self.args.clone();
        if strict {
            args.push("--strict".to_string());
        }
        args.extend(
            packages
                .iter()
                .map(|(name, version)| format!("{name}@{version}")),
        );
        args
    }

    async fn run(&self, args: Vec<String>) -> anyhow::Result<std::process::Output> {
        let child = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    anyhow::anyhow!("{} timed out after {}s", self.program, limit.as_secs())
                })??,
            None => child.wait_with_output().await?,
        };
        Ok(output)
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(&self, packages: &BTreeMap<String, String>, strict: bool) -> InstallStatus {
        let args = self.command_args(packages, strict);
        info!(program = %self.program, packages = packages.len(), "running installer");

        match self.run(args).await {
            Ok(output) if output.status.success() => InstallStatus::Installed,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let code = output.status.code().unwrap_or(-1);
                warn!(program = %self.program, code, stderr = %stderr, "installer failed");
                InstallStatus::Failed {
                    reason: format!("exit code {code}: {stderr}"),
                }
            }
            Err(e) => {
                warn!(program = %self.program, error = %e, "installer could not run");
                InstallStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
