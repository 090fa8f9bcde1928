// Registry protocol handler
//
// The HTTP endpoints other registries talk to. The same router serves both
// the leader (on the discovery port) and delegates (on an ephemeral port).

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::client::{AddDelegateRequest, RegistryClient};
use super::directory::ServiceDirectory;

/// Shared state behind every protocol request.
pub struct ProtocolState {
    pub directory: Arc<ServiceDirectory>,
    pub client: RegistryClient,
}

/// Build the registry protocol router.
pub fn create_router(state: Arc<ProtocolState>) -> Router {
    Router::new()
        .route("/services", get(handle_get_services))
        .route("/add-delegate", post(handle_add_delegate))
        .route("/ping", get(handle_ping))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /services: local services followed by every delegate's services.
pub async fn handle_get_services(State(state): State<Arc<ProtocolState>>) -> Response {
    let (mut services, delegates) = state.directory.snapshot();

    // Delegates are rare, so they're queried one after another rather than
    // in parallel. The directory lock is not held here.
    for delegate in delegates {
        match state.client.fetch_services(delegate).await {
            Ok(part) => services.extend(part),
            Err(e) if e.is_unreachable() => {
                tracing::info!("Delegate {} has gone away, removing it: {}", delegate, e);
                state.directory.remove_delegate(delegate);
            }
            Err(e) => {
                tracing::warn!("Error fetching services from delegate {}: {}", delegate, e);
            }
        }
    }

    match serde_json::to_vec(&services) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Error generating JSON: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /add-delegate: attach another registry on this host.
pub async fn handle_add_delegate(
    State(state): State<Arc<ProtocolState>>,
    body: Bytes,
) -> StatusCode {
    let req: AddDelegateRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!("Malformed add-delegate request: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    match state.directory.add_delegate(req.addr_port) {
        Ok(()) => {
            tracing::info!("Adding delegate at {}", req.addr_port);
            StatusCode::OK
        }
        Err(addr) => {
            tracing::warn!("add-delegate request for non-local address {}", addr);
            StatusCode::FORBIDDEN
        }
    }
}

/// GET /ping: liveness only.
pub async fn handle_ping() -> StatusCode {
    StatusCode::OK
}
