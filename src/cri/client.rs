//! CRI client over the runtime's Unix socket
//!
//! The channel is opened once at startup and shared by every request.
//! tonic's `Channel` multiplexes concurrent calls, so each call clones the
//! client instead of taking a lock.

use std::collections::HashMap;
use std::path::Path;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, warn};

use super::proto::{ListPodSandboxRequest, PodSandboxStatusRequest, RuntimeServiceClient};
use super::resolver::{SandboxRecord, SandboxRuntime};
use crate::config::CriApiVersion;
use crate::error::ResolveError;

/// Largest CRI response we accept (16 MiB); sandbox listings on busy nodes get big
pub const MAX_RECV_MSG_SIZE: usize = 16 * 1024 * 1024;

/// Long-lived connection to the container runtime
#[derive(Debug, Clone)]
pub struct CriClient {
    client: RuntimeServiceClient,
}

impl CriClient {
    /// Connect to the CRI server listening on `socket_path`
    ///
    /// # Arguments
    /// * `socket_path` - The runtime's Unix socket (e.g. /var/run/crio/crio.sock)
    /// * `version` - Which `RuntimeService` package the runtime serves
    pub async fn connect(
        socket_path: impl AsRef<Path>,
        version: CriApiVersion,
    ) -> Result<Self, ResolveError> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let path = socket_path.clone();

        // The URI is required by tonic but never dialed; the connector below
        // always opens the Unix socket.
        let channel = Endpoint::try_from("http://[::]:50051")?
            .connect_with_connector(service_fn(move |_: Uri| {
                let path = path.clone();
                async move {
                    let stream = UnixStream::connect(&path).await.map_err(|e| {
                        warn!(endpoint = %path.display(), error = %e, "Failed to connect to CRI server");
                        e
                    })?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            }))
            .await
            .map_err(|e| {
                ResolveError::RuntimeUnavailable(format!(
                    "failed to connect to CRI server using socket file {:?}: {}",
                    socket_path, e
                ))
            })?;

        let client = RuntimeServiceClient::new(channel, version.service_name())
            .max_decoding_message_size(MAX_RECV_MSG_SIZE);

        debug!(socket = %socket_path.display(), service = version.service_name(), "Connected to CRI server");

        Ok(Self { client })
    }
}

#[tonic::async_trait]
impl SandboxRuntime for CriClient {
    async fn list_sandboxes(&self) -> Result<Vec<SandboxRecord>, ResolveError> {
        let mut client = self.client.clone();
        let response = client
            .list_pod_sandbox(ListPodSandboxRequest::default())
            .await?
            .into_inner();

        Ok(response
            .items
            .into_iter()
            .map(|sandbox| {
                let metadata = sandbox.metadata.unwrap_or_default();
                SandboxRecord {
                    id: sandbox.id,
                    name: metadata.name,
                    namespace: metadata.namespace,
                }
            })
            .collect())
    }

    async fn sandbox_info(&self, sandbox_id: &str) -> Result<HashMap<String, String>, ResolveError> {
        let mut client = self.client.clone();
        let response = client
            .pod_sandbox_status(PodSandboxStatusRequest {
                pod_sandbox_id: sandbox_id.to_string(),
                verbose: true,
            })
            .await?
            .into_inner();

        Ok(response.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_missing_socket_is_runtime_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("crio.sock");

        let err = CriClient::connect(&missing, CriApiVersion::V1alpha2)
            .await
            .unwrap_err();

        match err {
            ResolveError::RuntimeUnavailable(msg) => assert!(msg.contains("crio.sock")),
            other => panic!("expected RuntimeUnavailable, got {:?}", other),
        }
    }
}
