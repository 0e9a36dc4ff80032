//! Pod → network-namespace pid resolution
//!
//! ```text
//! (namespace, name) ──ListPodSandbox──► sandbox id
//!                   ──PodSandboxStatus(verbose)──► info["info"] JSON ──► pid
//! ```
//!
//! Filtering happens here, not in the runtime: the list call carries no
//! filter. If the runtime briefly lists two sandboxes with the same name and
//! namespace (pod recreation), the first one listed is used and a warning is
//! logged. That choice is not stable across calls.

use std::collections::HashMap;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::PodIdentity;
use crate::error::ResolveError;
use crate::metrics::RESOLVE_DURATION;

/// Key of the verbose status map that holds the runtime's JSON details
const STATUS_INFO_KEY: &str = "info";

/// A sandbox as listed by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRecord {
    pub id: String,
    pub name: String,
    pub namespace: String,
}

/// The two container-runtime calls resolution needs
#[tonic::async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Every sandbox the runtime currently knows about
    async fn list_sandboxes(&self) -> Result<Vec<SandboxRecord>, ResolveError>;

    /// The verbose status `info` map for one sandbox
    async fn sandbox_info(&self, sandbox_id: &str) -> Result<HashMap<String, String>, ResolveError>;
}

/// Anything that can name the pid whose network namespace a pod uses
#[tonic::async_trait]
pub trait TargetPidProvider: Send + Sync {
    async fn target_pid(&self, pod: &PodIdentity) -> Result<String, ResolveError>;
}

#[derive(Debug, Deserialize)]
struct StatusInfo {
    pid: Option<u64>,
}

/// Resolves pods to pids through a container runtime
pub struct PidResolver<R> {
    runtime: R,
}

impl<R: SandboxRuntime> PidResolver<R> {
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }

    async fn find_sandbox(&self, pod: &PodIdentity) -> Result<SandboxRecord, ResolveError> {
        let sandboxes = self.runtime.list_sandboxes().await?;

        let mut matches = sandboxes
            .into_iter()
            .filter(|s| s.name == pod.name && s.namespace == pod.namespace);

        let sandbox = matches.next().ok_or_else(|| ResolveError::SandboxNotFound {
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
        })?;

        let duplicates = matches.count();
        if duplicates > 0 {
            warn!(
                pod = %pod,
                sandbox_id = %sandbox.id,
                duplicates,
                "Multiple pod sandboxes share this name; using the first listed"
            );
        }

        Ok(sandbox)
    }
}

/// Pull the pid out of a verbose sandbox status `info` map
fn pid_from_info(sandbox_id: &str, info: &HashMap<String, String>) -> Result<String, ResolveError> {
    let blob = info
        .get(STATUS_INFO_KEY)
        .ok_or_else(|| ResolveError::InvalidProcessId {
            sandbox_id: sandbox_id.to_string(),
            reason: "status carries no info blob".to_string(),
        })?;

    debug!(sandbox_id, info = %blob, "Pod sandbox status info");

    let parsed: StatusInfo = serde_json::from_str(blob).map_err(|e| {
        ResolveError::RuntimeUnavailable(format!(
            "malformed status info for sandbox {}: {}",
            sandbox_id, e
        ))
    })?;

    match parsed.pid {
        None => Err(ResolveError::InvalidProcessId {
            sandbox_id: sandbox_id.to_string(),
            reason: "status info has no pid".to_string(),
        }),
        Some(0) => Err(ResolveError::InvalidProcessId {
            sandbox_id: sandbox_id.to_string(),
            reason: "PID is zero".to_string(),
        }),
        Some(pid) => Ok(pid.to_string()),
    }
}

#[tonic::async_trait]
impl<R: SandboxRuntime> TargetPidProvider for PidResolver<R> {
    async fn target_pid(&self, pod: &PodIdentity) -> Result<String, ResolveError> {
        let start = Instant::now();
        let result = self.resolve(pod).await;
        // Observed on every exit path, failures included
        RESOLVE_DURATION.observe(start.elapsed().as_secs_f64());
        result
    }
}

impl<R: SandboxRuntime> PidResolver<R> {
    async fn resolve(&self, pod: &PodIdentity) -> Result<String, ResolveError> {
        // 1. Match by name + namespace across the full listing
        let sandbox = self.find_sandbox(pod).await?;
        info!(pod = %pod, sandbox_id = %sandbox.id, "Found pod sandbox");

        // 2. Verbose status carries the runtime's JSON blob with the pid
        let status_info = self.runtime.sandbox_info(&sandbox.id).await?;
        let pid = pid_from_info(&sandbox.id, &status_info)?;

        info!(pod = %pod, pid = %pid, "Pod sandbox PID");
        Ok(pid)
    }
}
