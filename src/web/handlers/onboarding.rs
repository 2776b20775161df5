//! Onboarding-completion callback handler.
//!
//! Runs only after the service auth gate has authorized the request. The
//! handler derives the delivery's idempotency key, serves live replays from
//! the cache verbatim, and otherwise applies the step-completion effect
//! exactly once before caching the serialized success body.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::auth::signature::REQUEST_ID_HEADER;
use crate::idempotency::{IdempotencyRecord, derive_idempotency_key};
use crate::partners::StepCompletionError;
use crate::web::server::GatewayState;
use crate::web::types::{
    CallbackErrorResponse, CallbackSuccessResponse, OnboardingCallbackRequest,
};

pub async fn complete_onboarding_step_handler(
    State(state): State<Arc<GatewayState>>,
    Path((partner_id, step_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<OnboardingCallbackRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let step_data = req.step_data;
    let completed_at = match DateTime::parse_from_rfc3339(&step_data.completed_at) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "CallbackProcessingError",
                "invalid timestamp format for completed_at",
                &step_id,
                &partner_id,
                &request_id,
                "Send completed_at as an ISO-8601 timestamp, e.g. 2025-11-13T18:00:00Z",
            );
        }
    };

    let key = derive_idempotency_key(
        &partner_id,
        &step_id,
        &step_data.completed_at,
        &request_id,
    );

    // The section guard stays held across the completion await so that
    // concurrent retries of the same delivery serialize on the key check.
    let mut section = state.idempotency.begin().await;
    let now = Utc::now();
    let replay = section
        .get(&key, now)
        .map(|record| (record.response_body.clone(), record.request_id.clone()));

    let response = if let Some((body, original_request_id)) = replay {
        tracing::info!(
            partner_id = %partner_id,
            step_id = %step_id,
            request_id = %request_id,
            original_request_id = %original_request_id,
            "Replayed callback served from idempotency cache"
        );
        cached_success(body)
    } else {
        let result = state
            .partners
            .complete_step(&partner_id, &step_id, completed_at, &step_data.completed_by)
            .await;

        match result {
            Ok(completed) => {
                let success = CallbackSuccessResponse {
                    success: true,
                    step_id: step_id.clone(),
                    partner_id: partner_id.clone(),
                    completed,
                    completed_at: step_data.completed_at.clone(),
                    request_id: request_id.clone(),
                    message: format!("Onboarding step '{step_id}' completed successfully"),
                };
                // Serialize once; the same string is both the returned body
                // and the cached replay body.
                match serde_json::to_string(&success) {
                    Ok(body) => {
                        section.put(
                            key,
                            IdempotencyRecord {
                                partner_id: partner_id.clone(),
                                step_id: step_id.clone(),
                                completed_at: step_data.completed_at.clone(),
                                request_id: request_id.clone(),
                                created_at: now,
                                response_body: body.clone(),
                            },
                        );
                        tracing::info!(
                            partner_id = %partner_id,
                            step_id = %step_id,
                            request_id = %request_id,
                            completed,
                            "Onboarding step completion applied"
                        );
                        cached_success(body)
                    }
                    Err(err) => error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CallbackProcessingError",
                        &format!("failed to serialize response: {err}"),
                        &step_id,
                        &partner_id,
                        &request_id,
                        "Check the gateway logs for details",
                    ),
                }
            }
            Err(StepCompletionError::UnknownStep { .. }) => error_response(
                StatusCode::BAD_REQUEST,
                "InvalidStepError",
                &format!("step '{step_id}' is not recognized for partner '{partner_id}'"),
                &step_id,
                &partner_id,
                &request_id,
                "Verify the step id matches an onboarding step configured for this partner",
            ),
            Err(StepCompletionError::Internal { reason }) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CallbackProcessingError",
                &reason,
                &step_id,
                &partner_id,
                &request_id,
                "Check the payload format and the gateway logs for details",
            ),
        }
    };
    drop(section);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if elapsed_ms > state.latency_warn_ms {
        tracing::warn!(
            partner_id = %partner_id,
            step_id = %step_id,
            request_id = %request_id,
            elapsed_ms,
            threshold_ms = state.latency_warn_ms,
            "Callback handling exceeded latency target"
        );
    } else {
        tracing::debug!(
            partner_id = %partner_id,
            step_id = %step_id,
            request_id = %request_id,
            elapsed_ms,
            "Callback handled"
        );
    }

    response
}

/// Return a pre-serialized success body with the JSON content type.
fn cached_success(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

fn error_response(
    status: StatusCode,
    error: &str,
    reason: &str,
    step_id: &str,
    partner_id: &str,
    request_id: &str,
    hint: &str,
) -> Response {
    (
        status,
        Json(CallbackErrorResponse {
            success: false,
            error: error.to_string(),
            reason: reason.to_string(),
            step_id: step_id.to_string(),
            partner_id: partner_id.to_string(),
            request_id: request_id.to_string(),
            hint: hint.to_string(),
        }),
    )
        .into_response()
}
