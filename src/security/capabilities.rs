//! Startup capability check
//!
//! `nsenter --target <pid> -n` and `iptables-restore` need these in the
//! agent's effective set:
//!
//! ```text
//! CAP_SYS_ADMIN ──► setns() into the pod network namespace
//! CAP_SYS_PTRACE ─► open /proc/<pid>/ns/net of a foreign process
//! CAP_NET_ADMIN ──► modify netfilter tables
//! CAP_NET_RAW ────► iptables uses raw sockets for some matches
//! ```
//!
//! Missing capabilities are logged, never fatal: some runtimes grant
//! privileges in ways the effective set does not show.

use caps::{CapSet, Capability, CapsHashSet};
use tracing::{info, warn};

/// Capabilities the agent needs to do its job
pub const REQUIRED_CAPS: [Capability; 4] = [
    Capability::CAP_SYS_ADMIN,
    Capability::CAP_SYS_PTRACE,
    Capability::CAP_NET_ADMIN,
    Capability::CAP_NET_RAW,
];

fn cap_name(cap: Capability) -> &'static str {
    match cap {
        Capability::CAP_SYS_ADMIN => "CAP_SYS_ADMIN",
        Capability::CAP_SYS_PTRACE => "CAP_SYS_PTRACE",
        Capability::CAP_NET_ADMIN => "CAP_NET_ADMIN",
        Capability::CAP_NET_RAW => "CAP_NET_RAW",
        _ => "UNKNOWN_CAP",
    }
}

/// Required capabilities absent from `effective`
pub fn missing_from(effective: &CapsHashSet) -> Vec<&'static str> {
    REQUIRED_CAPS
        .iter()
        .filter(|cap| !effective.contains(cap))
        .map(|cap| cap_name(*cap))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// check_capabilities() - startup preflight
// ═══════════════════════════════════════════════════════════════════════════
// Reads the EFFECTIVE set only: that is what the kernel checks when nsenter
// calls setns() and iptables opens its netlink socket.
// ═══════════════════════════════════════════════════════════════════════════

/// Read this process's effective set and warn about anything missing
pub fn check_capabilities() {
    match caps::read(None, CapSet::Effective) {
        Ok(effective) => {
            let missing = missing_from(&effective);
            if missing.is_empty() {
                info!("Preflight passed: all required capabilities present");
            } else {
                warn!(
                    missing = %missing.join(", "),
                    "Missing capabilities; iptables requests will likely fail"
                );
            }
        }
        Err(e) => warn!(error = %e, "Unable to read capabilities"),
    }
}
