//! Command-line flags

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::config::{AgentConfig, CriApiVersion, LogFormat, DEFAULT_CRI_SOCKET, DEFAULT_PORT};

/// Runs on every cluster node and applies iptables rules inside pod network
/// namespaces on behalf of unprivileged sidecars.
#[derive(Parser, Debug)]
#[command(name = "nodeagent", author, version, about, long_about = None)]
pub struct Cli {
    /// Port the server should listen on
    #[arg(long, env = "NODE_AGENT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address the server should bind
    #[arg(long, env = "NODE_AGENT_LISTEN_ADDR", default_value = "0.0.0.0")]
    pub listen_addr: IpAddr,

    /// Path to the CRI socket
    #[arg(long, env = "NODE_AGENT_CRI_SOCKET_PATH", default_value = DEFAULT_CRI_SOCKET)]
    pub cri_socket_path: PathBuf,

    /// CRI API version served by the runtime
    #[arg(long, env = "NODE_AGENT_CRI_API_VERSION", value_enum, default_value_t = CriApiVersion::V1alpha2)]
    pub cri_api_version: CriApiVersion,

    /// Namespace-entry tool used to run iptables inside the pod
    #[arg(long, env = "NODE_AGENT_NSENTER_PATH", default_value = "nsenter")]
    pub nsenter_path: PathBuf,

    /// Directory for transient rules files (defaults to the system temp dir)
    #[arg(long, env = "NODE_AGENT_RULES_DIR")]
    pub rules_dir: Option<PathBuf>,

    /// Run requests for the same pod one at a time
    #[arg(long, env = "NODE_AGENT_SERIALIZE_PER_POD", default_value_t = true, action = ArgAction::Set)]
    pub serialize_per_pod: bool,

    /// Console log format
    #[arg(long, env = "NODE_AGENT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint (e.g. http://localhost:4317)
    #[arg(long, env = "NODE_AGENT_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Skip the capability check at startup
    #[arg(long, env = "NODE_AGENT_SKIP_PREFLIGHT")]
    pub skip_preflight: bool,
}

impl Cli {
    pub fn into_config(self) -> AgentConfig {
        AgentConfig {
            listen_addr: self.listen_addr,
            port: self.port,
            cri_socket_path: self.cri_socket_path,
            cri_api_version: self.cri_api_version,
            nsenter_path: self.nsenter_path,
            rules_dir: self.rules_dir.unwrap_or_else(std::env::temp_dir),
            serialize_per_pod: self.serialize_per_pod,
            log_format: self.log_format,
            otlp_endpoint: self.otlp_endpoint,
            skip_preflight: self.skip_preflight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_gives_defaults() {
        let config = Cli::try_parse_from(["nodeagent"]).unwrap().into_config();
        let defaults = AgentConfig::default();

        assert_eq!(config.port, defaults.port);
        assert_eq!(config.listen_addr, defaults.listen_addr);
        assert_eq!(config.cri_socket_path, defaults.cri_socket_path);
        assert_eq!(config.nsenter_path, defaults.nsenter_path);
        assert_eq!(config.rules_dir, defaults.rules_dir);
        assert!(config.serialize_per_pod);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Cli::try_parse_from([
            "nodeagent",
            "--port",
            "2020",
            "--cri-socket-path",
            "/run/containerd/containerd.sock",
            "--cri-api-version",
            "v1",
            "--serialize-per-pod",
            "false",
            "--log-format",
            "json",
            "--rules-dir",
            "/var/lib/nodeagent",
        ])
        .unwrap()
        .into_config();

        assert_eq!(config.port, 2020);
        assert_eq!(
            config.cri_socket_path,
            PathBuf::from("/run/containerd/containerd.sock")
        );
        assert_eq!(config.cri_api_version, CriApiVersion::V1);
        assert!(!config.serialize_per_pod);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rules_dir, PathBuf::from("/var/lib/nodeagent"));
    }

    #[test]
    fn test_rejects_unknown_api_version() {
        assert!(Cli::try_parse_from(["nodeagent", "--cri-api-version", "v2"]).is_err());
    }
}
