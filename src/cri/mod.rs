//! Container runtime (CRI) integration
//!
//! - `proto` - the RuntimeService messages and a unary gRPC client
//! - `client` - `CriClient`, a Unix-socket connection implementing `SandboxRuntime`
//! - `resolver` - `PidResolver`, which turns a pod identity into a pid

pub mod client;
pub mod proto;
pub mod resolver;

pub use client::CriClient;
pub use resolver::{PidResolver, SandboxRecord, SandboxRuntime, TargetPidProvider};
