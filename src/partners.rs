//! Partner onboarding-step directory.
//!
//! The callback handler's only contract with partner state is "mark step S
//! of partner P completed, return whether it is now completed". The trait
//! keeps that seam injectable so tests can count invocations and production
//! can swap in the partner-management service without touching the gateway.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Failures surfaced by the step-completion effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepCompletionError {
    #[error("unknown onboarding step '{step_id}' for partner '{partner_id}'")]
    UnknownStep { partner_id: String, step_id: String },

    #[error("partner directory failure: {reason}")]
    Internal { reason: String },
}

/// The external partner-step-completion effect.
///
/// Implementations must apply the completion atomically: either the step is
/// fully marked complete or it is not. Marking an already-completed step is
/// not an error; the step stays completed.
#[async_trait]
pub trait PartnerDirectory: Send + Sync {
    async fn complete_step(
        &self,
        partner_id: &str,
        step_id: &str,
        completed_at: DateTime<Utc>,
        completed_by: &str,
    ) -> Result<bool, StepCompletionError>;
}

#[derive(Debug, Clone)]
struct StepState {
    completed_at: DateTime<Utc>,
    completed_by: String,
}

/// In-memory directory backing local deployment and tests.
///
/// Partner records are created lazily on first completion; the onboarding
/// step catalog is fixed at construction.
pub struct InMemoryPartnerDirectory {
    step_catalog: Vec<String>,
    partners: RwLock<HashMap<String, HashMap<String, StepState>>>,
}

/// Onboarding steps every GrantBridge partner walks through.
pub const DEFAULT_STEP_CATALOG: [&str; 5] = [
    "organization_profile",
    "program_details",
    "eligibility_criteria",
    "contract_signature",
    "go_live",
];

impl InMemoryPartnerDirectory {
    pub fn new() -> Self {
        Self::with_step_catalog(DEFAULT_STEP_CATALOG.iter().map(|s| s.to_string()))
    }

    pub fn with_step_catalog(steps: impl IntoIterator<Item = String>) -> Self {
        Self {
            step_catalog: steps.into_iter().collect(),
            partners: RwLock::new(HashMap::new()),
        }
    }

    /// Completion attribution recorded for a step, if any.
    pub async fn step_completion(
        &self,
        partner_id: &str,
        step_id: &str,
    ) -> Option<(DateTime<Utc>, String)> {
        let partners = self.partners.read().await;
        let state = partners.get(partner_id)?.get(step_id)?;
        Some((state.completed_at, state.completed_by.clone()))
    }
}

impl Default for InMemoryPartnerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartnerDirectory for InMemoryPartnerDirectory {
    async fn complete_step(
        &self,
        partner_id: &str,
        step_id: &str,
        completed_at: DateTime<Utc>,
        completed_by: &str,
    ) -> Result<bool, StepCompletionError> {
        if !self.step_catalog.iter().any(|s| s == step_id) {
            return Err(StepCompletionError::UnknownStep {
                partner_id: partner_id.to_string(),
                step_id: step_id.to_string(),
            });
        }

        let mut partners = self.partners.write().await;
        let steps = partners.entry(partner_id.to_string()).or_default();
        // First completion wins; repeated completions leave the original
        // attribution in place and still report completed.
        steps.entry(step_id.to_string()).or_insert_with(|| StepState {
            completed_at,
            completed_by: completed_by.to_string(),
        });
        Ok(true)
    }
}
