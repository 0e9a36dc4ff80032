//! Privileged iptables execution inside pod network namespaces
//!
//! - `runner` - `CommandRunner` and the `nsenter`-backed implementation
//! - `executor` - `RuleExecutor`, the restore-then-save sequence for one family

pub mod executor;
pub mod runner;

pub use executor::RuleExecutor;
pub use runner::{CommandOutput, CommandRunner, NsenterRunner};

use std::fmt;

/// IP family a rule set applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn restore_command(self) -> &'static str {
        match self {
            IpFamily::V4 => "iptables-restore",
            IpFamily::V6 => "ip6tables-restore",
        }
    }

    pub fn save_command(self) -> &'static str {
        match self {
            IpFamily::V4 => "iptables-save",
            IpFamily::V6 => "ip6tables-save",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "ipv4"),
            IpFamily::V6 => write!(f, "ipv6"),
        }
    }
}
