//! HTTP routes
//!
//! - `POST /iptables` - apply rules for a pod, reply with restore/save output
//! - `GET /healthz` - readiness probe
//! - `GET /metrics` - Prometheus text exposition

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::orchestrator::Orchestrator;
use crate::api::{IptablesRequest, IptablesResponse};
use crate::error::OrchestrationError;
use crate::metrics::{self, IPTABLES_REQUESTS_TOTAL, REQUESTS_IN_FLIGHT};

/// Shared router state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Create the node agent router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/iptables", post(handle_iptables))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

async fn handle_iptables(State(state): State<AppState>, body: Bytes) -> Response {
    // Decode and validate before touching the runtime
    let request: IptablesRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return decode_error(e.to_string()),
    };
    let pod = request.pod();
    if let Err(msg) = pod.validate() {
        return decode_error(msg);
    }

    let span = info_span!(
        "iptables",
        request_id = %Uuid::now_v7(),
        pod_namespace = %pod.namespace,
        pod_name = %pod.name,
    );

    // The exchange runs in its own task. A client that disconnects or times
    // out drops this handler, but restore/save still run to completion and
    // the in-flight gauge stays balanced.
    let orchestrator = state.orchestrator.clone();
    let exchange = tokio::spawn(
        async move {
            REQUESTS_IN_FLIGHT.inc();
            let result = orchestrator.handle(&request).await;
            REQUESTS_IN_FLIGHT.dec();
            record_outcome(&result);
            result
        }
        .instrument(span),
    );

    match exchange.await {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(Err(e)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        Err(join_err) => {
            error!(error = %join_err, "iptables exchange aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, join_err.to_string()).into_response()
        }
    }
}

/// Count and log how an exchange ended
fn record_outcome(result: &Result<IptablesResponse, OrchestrationError>) {
    match result {
        Ok(_) => {
            IPTABLES_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();
            info!("Finished. Returning 200 OK");
        }
        Err(e) => {
            IPTABLES_REQUESTS_TOTAL.with_label_values(&[e.stage()]).inc();
            error!(stage = e.stage(), error = %e, "iptables request failed");
            if let OrchestrationError::Execute { source, .. } = e {
                let partial = source.partial_result();
                info!(
                    restore_output = %partial.restore_command_output,
                    save_output = %partial.save_command_output,
                    "Output captured before the failure"
                );
            }
        }
    }
}

fn decode_error(msg: String) -> Response {
    IPTABLES_REQUESTS_TOTAL
        .with_label_values(&["decode_error"])
        .inc();
    info!(error = %msg, "Error decoding iptables request");
    (StatusCode::BAD_REQUEST, msg).into_response()
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_text() -> Response {
    match metrics::render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
