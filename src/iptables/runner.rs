//! Running commands inside another process's network namespace

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{error, info};

/// Exit status and captured output of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Human-readable exit status (e.g. "exit status: 1")
    pub status: String,
    /// stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            status: "exit status: 0".to_string(),
            output: output.into(),
        }
    }

    pub fn failed(status: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.into(),
            output: output.into(),
        }
    }
}

/// Runs `command args...` inside the network namespace of `target_pid`.
///
/// `Err` means the command could not be started at all; a command that ran
/// and exited non-zero is `Ok` with `success == false`.
#[tonic::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run_in_netns(
        &self,
        target_pid: &str,
        command: &str,
        args: &[String],
    ) -> std::io::Result<CommandOutput>;
}

/// `nsenter --target <pid> -n <command> <args...>`
///
/// Only the network namespace is entered; the command binary comes from the
/// agent's own mount namespace.
#[derive(Debug, Clone)]
pub struct NsenterRunner {
    nsenter: PathBuf,
}

impl NsenterRunner {
    pub fn new(nsenter: impl AsRef<Path>) -> Self {
        Self {
            nsenter: nsenter.as_ref().to_path_buf(),
        }
    }

    fn build_args(target_pid: &str, command: &str, args: &[String]) -> Vec<String> {
        let mut full = vec![
            "--target".to_string(),
            target_pid.to_string(),
            "-n".to_string(),
            command.to_string(),
        ];
        full.extend(args.iter().cloned());
        full
    }
}

#[tonic::async_trait]
impl CommandRunner for NsenterRunner {
    async fn run_in_netns(
        &self,
        target_pid: &str,
        command: &str,
        args: &[String],
    ) -> std::io::Result<CommandOutput> {
        let full_args = Self::build_args(target_pid, command, args);
        info!("Running {} {}", self.nsenter.display(), full_args.join(" "));

        // Not kill_on_drop: once started, a restore always runs to completion
        let output = Command::new(&self.nsenter)
            .args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                error!(error = %e, "nsenter could not be started");
                e
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            info!(output = %combined, "nsenter done");
            Ok(CommandOutput::ok(combined))
        } else {
            error!(status = %output.status, "nsenter failed");
            info!(output = %combined, "nsenter out");
            Ok(CommandOutput::failed(output.status.to_string(), combined))
        }
    }
}
