//! Privilege checks for the node agent
//!
//! The agent runs as a privileged DaemonSet pod. It never drops
//! capabilities; it only reports at startup which of the ones it relies on
//! are absent from its effective set.

pub mod capabilities;

pub use capabilities::{check_capabilities, missing_from, REQUIRED_CAPS};
