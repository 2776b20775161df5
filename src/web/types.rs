//! Wire types for the callback gateway API.

use serde::{Deserialize, Serialize};

// --- Inbound callback payload ---

/// Body of `POST /api/v1/partners/{partner_id}/onboarding/{step_id}/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingCallbackRequest {
    pub step_data: OnboardingStepData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingStepData {
    /// ISO-8601 completion timestamp; must parse or the callback is rejected.
    pub completed_at: String,
    /// Free-text attribution for who or what completed the step.
    pub completed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_test: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
}

// --- Responses ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackSuccessResponse {
    pub success: bool,
    pub step_id: String,
    pub partner_id: String,
    pub completed: bool,
    pub completed_at: String,
    pub request_id: String,
    pub message: String,
}

/// Structured error body for 400/500 callback failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackErrorResponse {
    pub success: bool,
    /// Error kind: `InvalidStepError` or `CallbackProcessingError`.
    pub error: String,
    pub reason: String,
    pub step_id: String,
    pub partner_id: String,
    pub request_id: String,
    pub hint: String,
}

/// 401 body emitted by the service auth gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRejectionResponse {
    pub error: String,
    pub reason: String,
    pub hint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

// --- Contract description (public integration docs endpoint) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackContractResponse {
    pub contract_id: String,
    pub endpoint: String,
    pub required_headers: Vec<ContractHeader>,
    pub optional_headers: Vec<ContractHeader>,
    pub canonical_string: String,
    pub signature_algorithm: String,
    pub max_timestamp_drift_secs: i64,
    pub idempotency: ContractIdempotency,
    pub response_kinds: Vec<ContractResponseKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractHeader {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractIdempotency {
    pub key_fields: Vec<String>,
    pub ttl_secs: i64,
    pub replay_behavior: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractResponseKind {
    pub status: u16,
    pub error: Option<String>,
    pub description: String,
}
