//! One `/iptables` exchange: resolve once, then ipv4, then ipv6
//!
//! ```text
//! Start ─► Resolving ─┬─► ResolutionFailed
//!                     └─► V4Pending ─┬─► V4Failed
//!                                    └─► V6Pending ─┬─► V6Failed
//!                                                   └─► Done
//! ```
//!
//! Every failure ends the exchange; nothing is retried. ipv6 is never
//! attempted after an ipv4 failure.

use std::sync::Arc;

use tracing::{debug, info};

use super::locks::PodLocks;
use crate::api::{IptablesRequest, IptablesResponse};
use crate::cri::TargetPidProvider;
use crate::error::OrchestrationError;
use crate::iptables::{IpFamily, RuleExecutor};

pub struct Orchestrator {
    pids: Arc<dyn TargetPidProvider>,
    executor: RuleExecutor,
    /// `None` when per-pod serialization is disabled
    locks: Option<PodLocks>,
}

impl Orchestrator {
    /// # Arguments
    /// * `pids` - Source of the target pid for a pod
    /// * `executor` - Runs restore/save for one family
    /// * `serialize_per_pod` - Hold a per-pod lock for the whole exchange
    pub fn new(
        pids: Arc<dyn TargetPidProvider>,
        executor: RuleExecutor,
        serialize_per_pod: bool,
    ) -> Self {
        Self {
            pids,
            executor,
            locks: serialize_per_pod.then(PodLocks::new),
        }
    }

    pub async fn handle(
        &self,
        request: &IptablesRequest,
    ) -> Result<IptablesResponse, OrchestrationError> {
        let pod = request.pod();
        info!(pod = %pod, "Handling iptables request");

        // Hold the pod for the whole exchange so restore/save pairs never interleave
        let _guard = match &self.locks {
            Some(locks) => {
                let guard = locks.lock(&pod).await;
                debug!(pod = %pod, active_pods = locks.active(), "Acquired pod lock");
                Some(guard)
            }
            None => None,
        };

        // Resolve once; both families run against the same pid
        let target_pid = self
            .pids
            .target_pid(&pod)
            .await
            .map_err(|source| OrchestrationError::Resolve {
                pod: pod.clone(),
                source,
            })?;

        // ipv4 first; an ipv4 failure ends the exchange before ipv6
        let ipv4 = self
            .executor
            .apply(&target_pid, IpFamily::V4, &request.ipv4_options.rules)
            .await
            .map_err(|source| OrchestrationError::Execute {
                family: IpFamily::V4,
                source,
            })?;

        let ipv6 = self
            .executor
            .apply(&target_pid, IpFamily::V6, &request.ipv6_options.rules)
            .await
            .map_err(|source| OrchestrationError::Execute {
                family: IpFamily::V6,
                source,
            })?;

        Ok(IptablesResponse { ipv4, ipv6 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ExecutionResult, IptablesOptions, PodIdentity};
    use crate::error::{ExecutionError, ResolveError};
    use crate::iptables::{CommandOutput, CommandRunner};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedPid {
        pid: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedPid {
        fn new(pid: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                pid,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[tonic::async_trait]
    impl TargetPidProvider for FixedPid {
        async fn target_pid(&self, pod: &PodIdentity) -> Result<String, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pid.map(str::to_string).ok_or_else(|| ResolveError::SandboxNotFound {
                namespace: pod.namespace.clone(),
                name: pod.name.clone(),
            })
        }
    }

    /// Echoes fixed outputs; commands listed in `fail` exit non-zero
    struct EchoRunner {
        fail: Vec<&'static str>,
        commands: Mutex<Vec<(String, String)>>,
    }

    impl EchoRunner {
        fn new(fail: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                fail,
                commands: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<String> {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .map(|(_, c)| c.clone())
                .collect()
        }
    }

    #[tonic::async_trait]
    impl CommandRunner for EchoRunner {
        async fn run_in_netns(
            &self,
            target_pid: &str,
            command: &str,
            _args: &[String],
        ) -> std::io::Result<CommandOutput> {
            self.commands
                .lock()
                .unwrap()
                .push((target_pid.to_string(), command.to_string()));
            if self.fail.iter().any(|f| *f == command) {
                return Ok(CommandOutput::failed("exit status: 1", format!("{} broke", command)));
            }
            if command.ends_with("-restore") {
                Ok(CommandOutput::ok("<restore ran>"))
            } else {
                Ok(CommandOutput::ok("<save ran>"))
            }
        }
    }

    fn orchestrator(
        pids: Arc<FixedPid>,
        runner: Arc<EchoRunner>,
        dir: &tempfile::TempDir,
    ) -> Orchestrator {
        Orchestrator::new(pids, RuleExecutor::new(runner, dir.path()), true)
    }

    fn request() -> IptablesRequest {
        IptablesRequest {
            pod_namespace: "default".to_string(),
            pod_name: "pod-a".to_string(),
            ipv4_options: IptablesOptions {
                rules: "-A INPUT -j ACCEPT".to_string(),
            },
            ipv6_options: IptablesOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pids = FixedPid::new(Some("4242"));
        let runner = EchoRunner::new(vec![]);
        let orch = orchestrator(pids.clone(), runner.clone(), &dir);

        let response = orch.handle(&request()).await.unwrap();

        let expected = ExecutionResult {
            restore_command_output: "<restore ran>".to_string(),
            save_command_output: "<save ran>".to_string(),
        };
        assert_eq!(response.ipv4, expected);
        assert_eq!(response.ipv6, expected);
        assert_eq!(pids.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            runner.commands(),
            vec!["iptables-restore", "iptables-save", "ip6tables-restore", "ip6tables-save"]
        );
        assert!(runner
            .commands
            .lock()
            .unwrap()
            .iter()
            .all(|(pid, _)| pid == "4242"));
    }

    #[tokio::test]
    async fn test_resolution_failure_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = EchoRunner::new(vec![]);
        let orch = orchestrator(FixedPid::new(None), runner.clone(), &dir);

        let err = orch.handle(&request()).await.unwrap_err();

        assert!(matches!(
            err,
            OrchestrationError::Resolve {
                source: ResolveError::SandboxNotFound { .. },
                ..
            }
        ));
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_ipv4_failure_skips_ipv6() {
        let dir = tempfile::tempdir().unwrap();
        let runner = EchoRunner::new(vec!["iptables-restore"]);
        let orch = orchestrator(FixedPid::new(Some("1")), runner.clone(), &dir);

        let err = orch.handle(&request()).await.unwrap_err();

        assert_eq!(err.stage(), "ipv4_error");
        assert!(err.to_string().contains("iptables-restore broke"));
        assert!(!runner.commands().iter().any(|c| c.starts_with("ip6tables")));
    }

    #[tokio::test]
    async fn test_ipv6_failure_is_tagged_ipv6() {
        let dir = tempfile::tempdir().unwrap();
        let runner = EchoRunner::new(vec!["ip6tables-save"]);
        let orch = orchestrator(FixedPid::new(Some("1")), runner.clone(), &dir);

        let err = orch.handle(&request()).await.unwrap_err();

        match err {
            OrchestrationError::Execute {
                family: IpFamily::V6,
                source: ExecutionError::Save { restore_output, .. },
            } => assert_eq!(restore_output, "<restore ran>"),
            other => panic!("expected ipv6 save failure, got {:?}", other),
        }
        assert_eq!(runner.commands().len(), 4);
    }
}
