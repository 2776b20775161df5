//! Service auth gate: the single choke point in front of partner callbacks.
//!
//! Applied as middleware over the whole router. Requests outside the
//! configured protected prefixes (health, contract docs) pass through
//! untouched; everything else must carry a fresh, correctly signed
//! `X-Service-Auth` / `X-Service-Timestamp` pair or is rejected with 401
//! before any business logic runs.

use std::net::SocketAddr;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use secrecy::SecretString;

use crate::auth::replay::check_drift;
use crate::auth::signature::{
    REQUEST_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, verify_signature,
};
use crate::error::AuthError;
use crate::web::types::AuthRejectionResponse;

/// Bodies larger than this are rejected before signature verification; the
/// router's own body limit is the real bound, this is just the buffer cap.
const MAX_SIGNED_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for the gate middleware.
#[derive(Clone)]
pub struct ServiceAuthState {
    /// Present whenever the gate is active.
    pub secret: Option<SecretString>,
    /// Explicit opt-out for local development; logged loudly, never default.
    pub disabled: bool,
    pub max_drift_secs: i64,
    pub protected_prefixes: Vec<String>,
}

impl ServiceAuthState {
    fn protects(&self, path: &str) -> bool {
        self.protected_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Per-request gate: `Received → SignatureChecked → DriftChecked → Authorized`,
/// short-circuiting to a 401 at the first failed check.
pub async fn service_auth_middleware(
    State(auth): State<ServiceAuthState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !auth.protects(&path) {
        return next.run(req).await;
    }

    // Connect info is absent when the router is driven without a real
    // connection, as in oneshot tests.
    let caller_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    if auth.disabled {
        tracing::warn!(
            path = %path,
            caller_ip = %caller_ip,
            request_id = %request_id,
            "Service auth is DISABLED; letting request through unverified"
        );
        return next.run(req).await;
    }
    let Some(secret) = auth.secret.as_ref() else {
        // Config::resolve refuses this combination; fail closed if it
        // somehow occurs.
        tracing::error!(path = %path, "Service auth enabled but no secret available");
        return reject(&path, &caller_ip, &request_id, &AuthError::InvalidSignature);
    };

    let signature = match header_value(&req, SIGNATURE_HEADER) {
        Some(v) => v,
        None => return reject(&path, &caller_ip, &request_id, &AuthError::MissingSignature),
    };
    let timestamp = match header_value(&req, TIMESTAMP_HEADER) {
        Some(v) => v,
        None => return reject(&path, &caller_ip, &request_id, &AuthError::MissingTimestamp),
    };

    let drift = match check_drift(&timestamp, Utc::now().timestamp(), auth.max_drift_secs) {
        Ok(drift) => drift,
        Err(err) => {
            let err = match err {
                crate::auth::replay::DriftError::InvalidFormat => AuthError::InvalidTimestamp,
                crate::auth::replay::DriftError::TooOld { drift }
                | crate::auth::replay::DriftError::TooNew { drift } => AuthError::DriftExceeded {
                    drift,
                    max_drift: auth.max_drift_secs,
                },
            };
            return reject(&path, &caller_ip, &request_id, &err);
        }
    };

    // Buffer the body for signing, then hand the request back to the inner
    // handler with the same bytes.
    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_SIGNED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return reject(
                &path,
                &caller_ip,
                &request_id,
                &AuthError::BodyRead(err.to_string()),
            );
        }
    };

    if !verify_signature(
        secret,
        &signature,
        parts.method.as_str(),
        parts.uri.path(),
        &body_bytes,
        &timestamp,
        &request_id,
    ) {
        return reject(&path, &caller_ip, &request_id, &AuthError::InvalidSignature);
    }

    tracing::info!(
        path = %path,
        caller_ip = %caller_ip,
        request_id = %request_id,
        drift_secs = drift,
        "Service auth passed"
    );

    let req = Request::from_parts(parts, Body::from(body_bytes));
    next.run(req).await
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn reject(path: &str, caller_ip: &str, request_id: &str, err: &AuthError) -> Response {
    tracing::warn!(
        path = %path,
        caller_ip = %caller_ip,
        request_id = %request_id,
        reason = %err,
        "Service auth rejected"
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(AuthRejectionResponse {
            error: "Service authentication failed".to_string(),
            reason: err.to_string(),
            hint: "Include valid X-Service-Auth and X-Service-Timestamp headers".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, middleware, routing::post};
    use tower::ServiceExt;

    use crate::auth::signature::sign_callback;

    fn test_state(disabled: bool) -> ServiceAuthState {
        ServiceAuthState {
            secret: Some(SecretString::from("gate-secret")),
            disabled,
            max_drift_secs: 300,
            protected_prefixes: vec!["/api/v1/".to_string()],
        }
    }

    fn test_router(state: ServiceAuthState) -> Router {
        Router::new()
            .route("/api/v1/echo", post(|| async { "inner" }))
            .route("/api/health", axum::routing::get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                state,
                service_auth_middleware,
            ))
    }

    fn signed_request(body: &str, secret: &str) -> axum::http::Request<Body> {
        let headers = sign_callback(
            &SecretString::from(secret),
            "POST",
            "/api/v1/echo",
            body.as_bytes(),
            None,
            None,
        );
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/echo")
            .header(SIGNATURE_HEADER, headers.signature)
            .header(TIMESTAMP_HEADER, headers.timestamp)
            .header(REQUEST_ID_HEADER, headers.request_id)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn rejection_reason(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let body: AuthRejectionResponse = serde_json::from_slice(&bytes).unwrap();
        body.reason
    }

    #[tokio::test]
    async fn unprotected_paths_pass_without_headers() {
        let response = test_router(test_state(false))
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_signed_request_reaches_inner_handler() {
        let response = test_router(test_state(false))
            .oneshot(signed_request("{\"k\":1}", "gate-secret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_signature_wins_over_missing_timestamp() {
        let response = test_router(test_state(false))
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/v1/echo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let reason = rejection_reason(response).await;
        assert!(reason.contains("missing X-Service-Auth"), "{reason}");
    }

    #[tokio::test]
    async fn missing_timestamp_named_when_signature_present() {
        let response = test_router(test_state(false))
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/v1/echo")
                    .header(SIGNATURE_HEADER, "deadbeef")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let reason = rejection_reason(response).await;
        assert!(reason.contains("missing X-Service-Timestamp"), "{reason}");
    }

    #[tokio::test]
    async fn bad_timestamp_rejected_before_signature_is_examined() {
        let response = test_router(test_state(false))
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/v1/echo")
                    .header(SIGNATURE_HEADER, "not-even-hex")
                    .header(TIMESTAMP_HEADER, "yesterday")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let reason = rejection_reason(response).await.to_ascii_lowercase();
        assert!(reason.contains("timestamp"), "{reason}");
        assert!(!reason.contains("signature"), "{reason}");
    }

    #[tokio::test]
    async fn stale_timestamp_reports_drift() {
        let stale = Utc::now().timestamp() - 301;
        let headers = sign_callback(
            &SecretString::from("gate-secret"),
            "POST",
            "/api/v1/echo",
            b"{}",
            Some(stale),
            None,
        );
        let response = test_router(test_state(false))
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/v1/echo")
                    .header(SIGNATURE_HEADER, headers.signature)
                    .header(TIMESTAMP_HEADER, headers.timestamp)
                    .header(REQUEST_ID_HEADER, headers.request_id)
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let reason = rejection_reason(response).await;
        assert!(reason.contains("drift"), "{reason}");
    }

    #[tokio::test]
    async fn wrong_secret_yields_generic_invalid_signature() {
        let response = test_router(test_state(false))
            .oneshot(signed_request("{}", "some-other-secret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(rejection_reason(response).await, "invalid signature");
    }

    #[tokio::test]
    async fn disabled_mode_passes_everything() {
        let response = test_router(test_state(true))
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/v1/echo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
