//! Prometheus metrics for the node agent
//!
//! All metrics live in the default registry and are exposed on `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// `/iptables` requests by outcome (ok, decode_error, resolve_error, ipv4_error, ipv6_error)
    pub static ref IPTABLES_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "nodeagent_iptables_requests_total",
        "Total /iptables requests by outcome",
        &["outcome"]
    )
    .expect("register nodeagent_iptables_requests_total");

    pub static ref REQUESTS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "nodeagent_requests_in_flight",
        "Number of /iptables requests currently being handled"
    )
    .expect("register nodeagent_requests_in_flight");

    /// Time spent asking the container runtime for a sandbox pid
    pub static ref RESOLVE_DURATION: Histogram = register_histogram!(
        "nodeagent_resolve_duration_seconds",
        "Duration of pod sandbox pid resolution",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("register nodeagent_resolve_duration_seconds");

    /// Duration of each namespace-scoped command, labelled by command name
    pub static ref COMMAND_DURATION: HistogramVec = register_histogram_vec!(
        "nodeagent_command_duration_seconds",
        "Duration of namespace-scoped iptables commands",
        &["command"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0]
    )
    .expect("register nodeagent_command_duration_seconds");

    pub static ref COMMAND_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "nodeagent_command_failures_total",
        "Namespace-scoped commands that exited non-zero or failed to spawn",
        &["command"]
    )
    .expect("register nodeagent_command_failures_total");
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
