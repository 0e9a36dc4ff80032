//! Node agent - applies iptables rules inside pod network namespaces
//!
//! Sidecars cannot hold the privileges needed to rewrite their own pod's
//! netfilter tables. They POST their rules here instead; the agent finds
//! the pod sandbox through the container runtime (CRI), enters its network
//! namespace and runs `iptables-restore` then `iptables-save` for ipv4 and
//! ipv6.
//!
//! # Modules
//!
//! - `api` - JSON request/response types
//! - `cri` - CRI client and pod-to-pid resolution
//! - `iptables` - rules files and namespace-scoped command execution
//! - `server` - HTTP routes and request orchestration
//! - `config` / `cli` - runtime configuration
//! - `metrics` - Prometheus metrics
//! - `security` - startup capability check
//! - `tracing` - logging and optional OTLP export
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use nodeagent::{CriApiVersion, CriClient, NsenterRunner, Orchestrator, PidResolver, RuleExecutor};
//!
//! let cri = CriClient::connect("/var/run/crio/crio.sock", CriApiVersion::V1alpha2).await?;
//! let executor = RuleExecutor::new(Arc::new(NsenterRunner::new("nsenter")), std::env::temp_dir());
//! let orchestrator = Orchestrator::new(Arc::new(PidResolver::new(cri)), executor, true);
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod cri;
pub mod error;
pub mod iptables;
pub mod metrics;
pub mod security;
pub mod server;
pub mod tracing;

pub use api::{ExecutionResult, IptablesOptions, IptablesRequest, IptablesResponse, PodIdentity};
pub use config::{AgentConfig, CriApiVersion, LogFormat};
pub use cri::{CriClient, PidResolver, TargetPidProvider};
pub use error::{ExecutionError, OrchestrationError, ResolveError};
pub use iptables::{CommandRunner, IpFamily, NsenterRunner, RuleExecutor};
pub use server::{create_router, AppState, Orchestrator};
