//! CRI RuntimeService messages and client
//!
//! Only the two calls the agent makes are modelled: `ListPodSandbox` and
//! `PodSandboxStatus`. Field tags match `k8s.io/cri-api` `api.proto`, which
//! is identical between `runtime.v1alpha2` and `runtime.v1` for these
//! messages; only the service path differs (see `CriApiVersion`).
//! Unknown fields sent by the runtime are skipped by prost on decode.

use std::collections::HashMap;

use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PodSandboxState {
    SandboxReady = 0,
    SandboxNotready = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PodSandboxStateValue {
    #[prost(enumeration = "PodSandboxState", tag = "1")]
    pub state: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PodSandboxFilter {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub state: ::core::option::Option<PodSandboxStateValue>,
    #[prost(map = "string, string", tag = "3")]
    pub label_selector: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListPodSandboxRequest {
    #[prost(message, optional, tag = "1")]
    pub filter: ::core::option::Option<PodSandboxFilter>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PodSandboxMetadata {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub uid: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(uint32, tag = "4")]
    pub attempt: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PodSandbox {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub metadata: ::core::option::Option<PodSandboxMetadata>,
    #[prost(enumeration = "PodSandboxState", tag = "3")]
    pub state: i32,
    #[prost(int64, tag = "4")]
    pub created_at: i64,
    #[prost(map = "string, string", tag = "5")]
    pub labels: HashMap<String, String>,
    #[prost(map = "string, string", tag = "6")]
    pub annotations: HashMap<String, String>,
    #[prost(string, tag = "7")]
    pub runtime_handler: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListPodSandboxResponse {
    #[prost(message, repeated, tag = "1")]
    pub items: ::prost::alloc::vec::Vec<PodSandbox>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PodSandboxStatusRequest {
    #[prost(string, tag = "1")]
    pub pod_sandbox_id: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub verbose: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PodSandboxStatus {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub metadata: ::core::option::Option<PodSandboxMetadata>,
    #[prost(enumeration = "PodSandboxState", tag = "3")]
    pub state: i32,
    #[prost(int64, tag = "4")]
    pub created_at: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PodSandboxStatusResponse {
    #[prost(message, optional, tag = "1")]
    pub status: ::core::option::Option<PodSandboxStatus>,
    /// Runtime-specific details, only filled in for verbose requests
    #[prost(map = "string, string", tag = "2")]
    pub info: HashMap<String, String>,
}

/// Unary client for the subset of `RuntimeService` the agent uses
#[derive(Debug, Clone)]
pub struct RuntimeServiceClient {
    inner: tonic::client::Grpc<Channel>,
    service: &'static str,
}

impl RuntimeServiceClient {
    /// `service` is the fully-qualified service name, e.g.
    /// `runtime.v1alpha2.RuntimeService`
    pub fn new(channel: Channel, service: &'static str) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
            service,
        }
    }

    /// Limits the maximum size of a decoded message
    pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
        self.inner = self.inner.max_decoding_message_size(limit);
        self
    }

    pub async fn list_pod_sandbox(
        &mut self,
        request: ListPodSandboxRequest,
    ) -> Result<Response<ListPodSandboxResponse>, Status> {
        self.unary("ListPodSandbox", request).await
    }

    pub async fn pod_sandbox_status(
        &mut self,
        request: PodSandboxStatusRequest,
    ) -> Result<Response<PodSandboxStatusResponse>, Status> {
        self.unary("PodSandboxStatus", request).await
    }

    async fn unary<M1, M2>(&mut self, method: &str, message: M1) -> Result<Response<M2>, Status>
    where
        M1: ::prost::Message + Send + Sync + 'static,
        M2: ::prost::Message + Default + Send + Sync + 'static,
    {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("Service was not ready: {}", e)))?;

        let path: PathAndQuery = format!("/{}/{}", self.service, method)
            .parse()
            .map_err(|e| Status::internal(format!("invalid method path: {}", e)))?;
        let codec = tonic::codec::ProstCodec::<M1, M2>::default();

        self.inner.unary(Request::new(message), path, codec).await
    }
}
