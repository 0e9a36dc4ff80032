//! Error types for the resolve-then-execute pipeline
//!
//! Each stage has its own error so callers (and logs) can tell a missing
//! sandbox apart from a failed `iptables-restore`:
//! - `ResolveError` - container runtime lookup of the target pid
//! - `ExecutionError` - restore/save inside the pod network namespace
//! - `OrchestrationError` - which stage of a request failed

use thiserror::Error;

use crate::api::{ExecutionResult, PodIdentity};
use crate::iptables::IpFamily;

/// Failure while resolving a pod to the pid that anchors its network namespace.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The CRI call failed or returned something unusable.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// No listed sandbox carries the requested name and namespace.
    #[error("no pod sandbox found for {namespace}/{name}")]
    SandboxNotFound { namespace: String, name: String },

    /// The sandbox exists but no process can be entered.
    #[error("pod sandbox {sandbox_id} has no usable pid: {reason}")]
    InvalidProcessId { sandbox_id: String, reason: String },
}

impl From<tonic::Status> for ResolveError {
    fn from(status: tonic::Status) -> Self {
        ResolveError::RuntimeUnavailable(format!(
            "{:?}: {}",
            status.code(),
            status.message()
        ))
    }
}

impl From<tonic::transport::Error> for ResolveError {
    fn from(e: tonic::transport::Error) -> Self {
        ResolveError::RuntimeUnavailable(e.to_string())
    }
}

/// A namespace-scoped command that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// e.g. `iptables-restore`
    pub command: String,
    /// Exit status or spawn error
    pub reason: String,
    /// Combined stdout/stderr captured before the failure
    pub output: String,
}

/// Failure while applying one family's rules.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("unable to write {family} rules file: {source}")]
    RulesFile {
        family: IpFamily,
        #[source]
        source: std::io::Error,
    },

    #[error("{} failed in network namespace of pid {pid}: {}\n{}", .failure.command, .failure.reason, .failure.output)]
    Restore { pid: String, failure: CommandFailure },

    #[error(
        "{} failed in network namespace of pid {pid}: {}\n{}\nrestore output:\n{restore_output}",
        .failure.command, .failure.reason, .failure.output
    )]
    Save {
        pid: String,
        restore_output: String,
        failure: CommandFailure,
    },
}

impl ExecutionError {
    /// Whatever output was captured before the failure.
    pub fn partial_result(&self) -> ExecutionResult {
        match self {
            ExecutionError::RulesFile { .. } => ExecutionResult::default(),
            ExecutionError::Restore { failure, .. } => ExecutionResult {
                restore_command_output: failure.output.clone(),
                save_command_output: String::new(),
            },
            ExecutionError::Save {
                restore_output,
                failure,
                ..
            } => ExecutionResult {
                restore_command_output: restore_output.clone(),
                save_command_output: failure.output.clone(),
            },
        }
    }
}

/// Failure of a whole `/iptables` exchange, tagged with the stage that broke.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("resolving target pid for {pod}: {source}")]
    Resolve {
        pod: PodIdentity,
        #[source]
        source: ResolveError,
    },

    #[error("applying {family} rules: {source}")]
    Execute {
        family: IpFamily,
        #[source]
        source: ExecutionError,
    },
}

impl OrchestrationError {
    /// Short label used for metrics and logs.
    pub fn stage(&self) -> &'static str {
        match self {
            OrchestrationError::Resolve { .. } => "resolve_error",
            OrchestrationError::Execute {
                family: IpFamily::V4,
                ..
            } => "ipv4_error",
            OrchestrationError::Execute {
                family: IpFamily::V6,
                ..
            } => "ipv6_error",
        }
    }
}
