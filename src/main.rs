//! nodeagent - privileged per-node iptables service
//!
//! Usage:
//!   nodeagent [--port 1979] [--cri-socket-path /var/run/crio/crio.sock]
//!
//! Every flag can also be set through a `NODE_AGENT_*` environment variable.

use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use nodeagent::cli::Cli;
use nodeagent::cri::{CriClient, PidResolver};
use nodeagent::iptables::{NsenterRunner, RuleExecutor};
use nodeagent::security;
use nodeagent::server::{self, Orchestrator};
use nodeagent::tracing::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Flags first; tracing needs the log format
    let config = Cli::parse().into_config();

    init_tracing(
        "nodeagent",
        config.log_format,
        config.otlp_endpoint.as_deref(),
    )?;

    info!(version = env!("CARGO_PKG_VERSION"), "nodeagent starting");
    info!(
        port = config.port,
        cri_socket = %config.cri_socket_path.display(),
        cri_api = config.cri_api_version.service_name(),
        serialize_per_pod = config.serialize_per_pod,
        "Configuration loaded"
    );

    // Capability preflight (warn only)
    if config.skip_preflight {
        warn!("Skipping capability preflight");
    } else {
        security::check_capabilities();
    }

    // The CRI socket must be reachable before we accept requests
    let cri = CriClient::connect(&config.cri_socket_path, config.cri_api_version)
        .await
        .map_err(|e| {
            error!(error = %e, "Unable to reach the container runtime");
            e
        })?;

    // Wire resolver → executor → orchestrator
    let runner = Arc::new(NsenterRunner::new(&config.nsenter_path));
    let executor = RuleExecutor::new(runner, &config.rules_dir);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(PidResolver::new(cri)),
        executor,
        config.serialize_per_pod,
    ));

    // Serve until Ctrl+C/SIGTERM, then flush spans
    let result = server::run(&config, orchestrator, shutdown_signal()).await;

    shutdown_tracing();
    result?;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
