//! Applying one IP family's rules inside a pod network namespace
//!
//! ```text
//! rules text ──► <family>-iptables-rules-XXXX.txt
//!                     │
//!                     ▼
//!   nsenter -n <restore> --noflush <file>   ── fails? ──► ExecutionError::Restore
//!                     │                                   (save never runs)
//!                     ▼
//!   nsenter -n <save>                       ── fails? ──► ExecutionError::Save
//!                     │                                   (keeps restore output)
//!                     ▼
//!            ExecutionResult { restore, save }
//! ```
//!
//! The rules file is a `tempfile::NamedTempFile`, so it is unlinked when it
//! drops at the end of `apply`, whichever way `apply` returns.

use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::runner::CommandRunner;
use super::IpFamily;
use crate::api::ExecutionResult;
use crate::error::{CommandFailure, ExecutionError};
use crate::metrics::{COMMAND_DURATION, COMMAND_FAILURES_TOTAL};

// ═══════════════════════════════════════════════════════════════════════════
// RuleExecutor
// ═══════════════════════════════════════════════════════════════════════════
// One instance serves every request. It holds no per-request state; the
// rules file and command outputs live only inside `apply`.
// ═══════════════════════════════════════════════════════════════════════════

/// Applies rules through a `CommandRunner`
#[derive(Clone)]
pub struct RuleExecutor {
    runner: Arc<dyn CommandRunner>,
    rules_dir: PathBuf,
}

impl RuleExecutor {
    /// # Arguments
    /// * `runner` - How namespace-scoped commands are run
    /// * `rules_dir` - Where transient rules files are created
    pub fn new(runner: Arc<dyn CommandRunner>, rules_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            rules_dir: rules_dir.into(),
        }
    }

    /// Restore `rules` for `family` in the network namespace of `target_pid`,
    /// then dump the resulting state with the family's save command.
    pub async fn apply(
        &self,
        target_pid: &str,
        family: IpFamily,
        rules: &str,
    ) -> Result<ExecutionResult, ExecutionError> {
        // 1. Stage the rules on disk; dropped (and unlinked) when apply returns
        let rules_file = self.write_rules_file(family, rules)?;
        let rules_path = rules_file.path().to_string_lossy().into_owned();
        debug!(
            family = %family,
            path = %rules_path,
            rules = %rules,
            "Wrote rules file"
        );

        // 2. Load them without flushing existing chains
        let restore_args = vec!["--noflush".to_string(), rules_path];
        let restore_output = self
            .run(target_pid, family.restore_command(), &restore_args)
            .await
            .map_err(|failure| ExecutionError::Restore {
                pid: target_pid.to_string(),
                failure,
            })?;

        // 3. Dump what the namespace ended up with
        let save_output = self
            .run(target_pid, family.save_command(), &[])
            .await
            .map_err(|failure| ExecutionError::Save {
                pid: target_pid.to_string(),
                restore_output: restore_output.clone(),
                failure,
            })?;

        info!(family = %family, pid = %target_pid, "Applied rules");
        Ok(ExecutionResult {
            restore_command_output: restore_output,
            save_command_output: save_output,
        })
    }

    fn write_rules_file(&self, family: IpFamily, rules: &str) -> Result<NamedTempFile, ExecutionError> {
        let to_err = |source| ExecutionError::RulesFile { family, source };

        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-iptables-rules-", family))
            .suffix(".txt")
            .tempfile_in(&self.rules_dir)
            .map_err(to_err)?;

        let mut writer = BufWriter::new(file.as_file_mut());
        writer.write_all(rules.as_bytes()).map_err(to_err)?;
        writer.flush().map_err(to_err)?;
        drop(writer);

        Ok(file)
    }

    /// Run one command, timing it and folding spawn errors and non-zero
    /// exits into a `CommandFailure`.
    async fn run(
        &self,
        target_pid: &str,
        command: &str,
        args: &[String],
    ) -> Result<String, CommandFailure> {
        let start = Instant::now();
        let result = self.runner.run_in_netns(target_pid, command, args).await;
        COMMAND_DURATION
            .with_label_values(&[command])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(out) if out.success => Ok(out.output),
            Ok(out) => {
                COMMAND_FAILURES_TOTAL.with_label_values(&[command]).inc();
                Err(CommandFailure {
                    command: command.to_string(),
                    reason: out.status,
                    output: out.output,
                })
            }
            Err(e) => {
                COMMAND_FAILURES_TOTAL.with_label_values(&[command]).inc();
                Err(CommandFailure {
                    command: command.to_string(),
                    reason: e.to_string(),
                    output: String::new(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iptables::runner::CommandOutput;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Call {
        pid: String,
        command: String,
        args: Vec<String>,
        /// Contents of the rules file at the time of the call, if one was passed
        file_contents: Option<String>,
    }

    /// Records calls and answers restore/save with canned results
    struct ScriptedRunner {
        calls: Mutex<Vec<Call>>,
        restore: CommandOutput,
        save: CommandOutput,
    }

    impl ScriptedRunner {
        fn new(restore: CommandOutput, save: CommandOutput) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                restore,
                save,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[tonic::async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run_in_netns(
            &self,
            target_pid: &str,
            command: &str,
            args: &[String],
        ) -> std::io::Result<CommandOutput> {
            let file_contents = args.last().and_then(|p| std::fs::read_to_string(p).ok());
            self.calls.lock().unwrap().push(Call {
                pid: target_pid.to_string(),
                command: command.to_string(),
                args: args.to_vec(),
                file_contents,
            });
            if command.ends_with("-restore") {
                Ok(self.restore.clone())
            } else {
                Ok(self.save.clone())
            }
        }
    }

    /// Fails to spawn every command
    struct BrokenRunner;

    #[tonic::async_trait]
    impl CommandRunner for BrokenRunner {
        async fn run_in_netns(
            &self,
            _target_pid: &str,
            _command: &str,
            _args: &[String],
        ) -> std::io::Result<CommandOutput> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "nsenter: not found"))
        }
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_restore_then_save() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(
            CommandOutput::ok("restored"),
            CommandOutput::ok("*filter\n-A INPUT -j ACCEPT\nCOMMIT\n"),
        ));
        let executor = RuleExecutor::new(runner.clone(), dir.path());

        let result = executor
            .apply("4242", IpFamily::V4, "-A INPUT -j ACCEPT")
            .await
            .unwrap();

        assert_eq!(result.restore_command_output, "restored");
        assert_eq!(result.save_command_output, "*filter\n-A INPUT -j ACCEPT\nCOMMIT\n");

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].pid, "4242");
        assert_eq!(calls[0].command, "iptables-restore");
        assert_eq!(calls[0].args[0], "--noflush");
        assert_eq!(calls[0].file_contents.as_deref(), Some("-A INPUT -j ACCEPT"));
        assert_eq!(calls[1].command, "iptables-save");
        assert!(calls[1].args.is_empty());
    }

    #[tokio::test]
    async fn test_ipv6_uses_ip6tables_and_family_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(CommandOutput::ok(""), CommandOutput::ok("")));
        let executor = RuleExecutor::new(runner.clone(), dir.path());

        executor.apply("7", IpFamily::V6, "").await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].command, "ip6tables-restore");
        assert_eq!(calls[1].command, "ip6tables-save");
        let file_name = Path::new(&calls[0].args[1])
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(file_name.starts_with("ipv6-iptables-rules-"));
        assert!(file_name.ends_with(".txt"));
        assert_eq!(calls[0].file_contents.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_rules_file_removed_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(CommandOutput::ok(""), CommandOutput::ok("")));
        let executor = RuleExecutor::new(runner.clone(), dir.path());

        executor.apply("1", IpFamily::V4, "-A OUTPUT -j DROP").await.unwrap();

        let rules_path = runner.calls()[0].args[1].clone();
        assert!(!Path::new(&rules_path).exists());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_restore_failure_skips_save_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(
            CommandOutput::failed("exit status: 2", "iptables-restore: line 1 failed"),
            CommandOutput::ok("never"),
        ));
        let executor = RuleExecutor::new(runner.clone(), dir.path());

        let err = executor.apply("1", IpFamily::V4, "garbage").await.unwrap_err();

        match &err {
            ExecutionError::Restore { pid, failure } => {
                assert_eq!(pid, "1");
                assert_eq!(failure.command, "iptables-restore");
                assert_eq!(failure.output, "iptables-restore: line 1 failed");
            }
            other => panic!("expected Restore error, got {:?}", other),
        }
        assert!(err.to_string().contains("line 1 failed"));
        assert_eq!(runner.calls().len(), 1);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_save_failure_keeps_restore_output_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(
            CommandOutput::ok("restore ok"),
            CommandOutput::failed("exit status: 1", "save blew up"),
        ));
        let executor = RuleExecutor::new(runner.clone(), dir.path());

        let err = executor.apply("1", IpFamily::V4, "-A INPUT -j ACCEPT").await.unwrap_err();

        match &err {
            ExecutionError::Save {
                restore_output,
                failure,
                ..
            } => {
                assert_eq!(restore_output, "restore ok");
                assert_eq!(failure.output, "save blew up");
            }
            other => panic!("expected Save error, got {:?}", other),
        }
        let text = err.to_string();
        assert!(text.contains("restore ok"));
        assert!(text.contains("save blew up"));
        assert_eq!(err.partial_result().restore_command_output, "restore ok");
        assert_eq!(runner.calls().len(), 2);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_restore_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = RuleExecutor::new(Arc::new(BrokenRunner), dir.path());

        let err = executor.apply("1", IpFamily::V4, "").await.unwrap_err();

        match err {
            ExecutionError::Restore { failure, .. } => {
                assert!(failure.reason.contains("nsenter: not found"));
                assert!(failure.output.is_empty());
            }
            other => panic!("expected Restore error, got {:?}", other),
        }
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_unwritable_rules_dir_is_rules_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let runner = Arc::new(ScriptedRunner::new(CommandOutput::ok(""), CommandOutput::ok("")));
        let executor = RuleExecutor::new(runner.clone(), missing);

        let err = executor.apply("1", IpFamily::V4, "").await.unwrap_err();

        assert!(matches!(err, ExecutionError::RulesFile { family: IpFamily::V4, .. }));
        assert!(runner.calls().is_empty());
    }
}
