//! Daemon configuration
//!
//! `AgentConfig` carries every knob the daemon reads at startup. The CLI
//! (see `cli.rs`) fills it in; tests build it directly from `Default`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Port the HTTP listener binds by default
pub const DEFAULT_PORT: u16 = 1979;

/// CRI-O's socket; containerd users pass `--cri-socket-path`
pub const DEFAULT_CRI_SOCKET: &str = "/var/run/crio/crio.sock";

/// Which CRI protobuf package the runtime serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CriApiVersion {
    /// `runtime.v1alpha2` (CRI-O < 1.24, containerd < 1.7)
    V1alpha2,
    /// `runtime.v1`
    V1,
}

impl CriApiVersion {
    /// Fully-qualified gRPC service name for the RuntimeService
    pub fn service_name(self) -> &'static str {
        match self {
            CriApiVersion::V1alpha2 => "runtime.v1alpha2.RuntimeService",
            CriApiVersion::V1 => "runtime.v1.RuntimeService",
        }
    }
}

/// Console log encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Configuration for the node agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address the HTTP listener binds
    pub listen_addr: IpAddr,
    /// Port the HTTP listener binds
    pub port: u16,
    /// Path to the container runtime's CRI socket
    pub cri_socket_path: PathBuf,
    /// CRI service version to speak
    pub cri_api_version: CriApiVersion,
    /// Namespace-entry tool
    pub nsenter_path: PathBuf,
    /// Directory holding transient rules files
    pub rules_dir: PathBuf,
    /// Serialize requests that target the same pod
    pub serialize_per_pod: bool,
    /// Console log encoding
    pub log_format: LogFormat,
    /// OTLP collector endpoint; spans are only exported when set
    pub otlp_endpoint: Option<String>,
    /// Skip the startup capability check
    pub skip_preflight: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            cri_socket_path: PathBuf::from(DEFAULT_CRI_SOCKET),
            cri_api_version: CriApiVersion::V1alpha2,
            nsenter_path: PathBuf::from("nsenter"),
            rules_dir: std::env::temp_dir(),
            serialize_per_pod: true,
            log_format: LogFormat::Text,
            otlp_endpoint: None,
            skip_preflight: false,
        }
    }
}

impl AgentConfig {
    /// Socket address for the HTTP listener
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }
}
