//! Axum HTTP server for the callback gateway.
//!
//! Assembles the router (health, contract docs, and the signed callback
//! endpoint), layers CORS, body limits, request tracing, and the service
//! auth gate, and runs with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::header,
    middleware,
    routing::{get, post},
};
use tokio::sync::oneshot;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::signature::{REQUEST_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::error::ServerError;
use crate::idempotency::IdempotencyStore;
use crate::partners::PartnerDirectory;
use crate::web::auth::{ServiceAuthState, service_auth_middleware};
use crate::web::handlers::onboarding::complete_onboarding_step_handler;
use crate::web::types::*;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "callback-gateway";

/// Shared state for all gateway handlers.
pub struct GatewayState {
    /// Step-completion effect; the in-memory directory locally, the partner
    /// management service in production.
    pub partners: Arc<dyn PartnerDirectory>,
    /// Idempotency cache for callback deliveries.
    pub idempotency: Arc<IdempotencyStore>,
    /// Advisory latency threshold for callback handling, in milliseconds.
    pub latency_warn_ms: u64,
    /// Drift window advertised by the contract endpoint.
    pub max_drift_secs: i64,
    /// Idempotency TTL advertised by the contract endpoint.
    pub idempotency_ttl_secs: i64,
    /// Shutdown signal sender.
    pub shutdown_tx: tokio::sync::RwLock<Option<oneshot::Sender<()>>>,
}

/// Start the gateway HTTP server.
///
/// Returns the actual bound `SocketAddr` (useful when binding to port 0).
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<GatewayState>,
    auth: ServiceAuthState,
) -> Result<SocketAddr, ServerError> {
    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::StartupFailed {
                reason: format!("Failed to bind to {addr}: {e}"),
            })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| ServerError::StartupFailed {
            reason: format!("Failed to get local addr: {e}"),
        })?;

    // Public routes sit outside the protected prefixes; the gate passes
    // them through without auth headers.
    let public = Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/docs/callback-contract",
            get(callback_contract_handler),
        );

    let callbacks = Router::new().route(
        "/api/v1/partners/{partner_id}/onboarding/{step_id}/complete",
        post(complete_onboarding_step_handler),
    );

    // CORS: the gateway is called by internal services, not browsers, but
    // the contract docs endpoint is browsed from same-host tooling.
    let cors = CorsLayer::new()
        .allow_origin([
            format!("http://{}:{}", bound_addr.ip(), bound_addr.port())
                .parse()
                .expect("valid origin"),
            format!("http://localhost:{}", bound_addr.port())
                .parse()
                .expect("valid origin"),
        ])
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            SIGNATURE_HEADER.parse().expect("valid header name"),
            TIMESTAMP_HEADER.parse().expect("valid header name"),
            REQUEST_ID_HEADER.parse().expect("valid header name"),
        ]));

    let app = Router::new()
        .merge(public)
        .merge(callbacks)
        .layer(middleware::from_fn_with_state(auth, service_auth_middleware))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
            tracing::info!("Callback gateway shutting down");
        })
        .await
        {
            tracing::error!("Callback gateway server error: {e}");
        }
    });

    Ok(bound_addr)
}

// --- Health ---

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
    })
}

// --- Contract description ---

async fn callback_contract_handler(
    State(state): State<Arc<GatewayState>>,
) -> Json<CallbackContractResponse> {
    Json(CallbackContractResponse {
        contract_id: "grantbridge.partner.onboarding-callback".to_string(),
        endpoint: "POST /api/v1/partners/{partner_id}/onboarding/{step_id}/complete".to_string(),
        required_headers: vec![
            ContractHeader {
                name: SIGNATURE_HEADER.to_string(),
                description: "Lowercase hex HMAC-SHA256 signature over the canonical string"
                    .to_string(),
            },
            ContractHeader {
                name: TIMESTAMP_HEADER.to_string(),
                description: "Request creation time as unix seconds".to_string(),
            },
        ],
        optional_headers: vec![ContractHeader {
            name: REQUEST_ID_HEADER.to_string(),
            description: "Opaque delivery id used for tracing and replay scoping; \
                          defaults to 'unknown'"
                .to_string(),
        }],
        canonical_string: "method \":\" path \":\" timestamp \":\" request_id \":\" body"
            .to_string(),
        signature_algorithm: "HMAC-SHA256, shared secret, constant-time verification".to_string(),
        max_timestamp_drift_secs: state.max_drift_secs,
        idempotency: ContractIdempotency {
            key_fields: vec![
                "partner_id".to_string(),
                "step_id".to_string(),
                "completed_at".to_string(),
                "request_id".to_string(),
            ],
            ttl_secs: state.idempotency_ttl_secs,
            replay_behavior: "Retries within the TTL return the original response verbatim \
                              with HTTP 200; the completion effect fires once."
                .to_string(),
        },
        response_kinds: vec![
            ContractResponseKind {
                status: 200,
                error: None,
                description: "Step completed (or replay of a completed delivery)".to_string(),
            },
            ContractResponseKind {
                status: 400,
                error: Some("InvalidStepError".to_string()),
                description: "Step id not recognized for this partner".to_string(),
            },
            ContractResponseKind {
                status: 400,
                error: Some("CallbackProcessingError".to_string()),
                description: "Malformed payload, e.g. unparseable completed_at".to_string(),
            },
            ContractResponseKind {
                status: 401,
                error: None,
                description: "Service authentication failed".to_string(),
            },
            ContractResponseKind {
                status: 500,
                error: Some("CallbackProcessingError".to_string()),
                description: "Unexpected failure applying the completion effect".to_string(),
            },
        ],
    })
}

impl GatewayState {
    /// Fire the graceful-shutdown signal, if the server is running.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }
}
