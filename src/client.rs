//! Outbound signed-callback client.
//!
//! The caller half of the wire contract: signs an onboarding callback with
//! the shared secret and POSTs it to a peer gateway. Used by integration
//! partners' services and by GrantBridge itself when forwarding completions
//! between environments.

use reqwest::StatusCode;
use secrecy::SecretString;
use url::Url;

use crate::auth::signature::{
    REQUEST_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER, sign_callback,
};
use crate::error::ClientError;
use crate::web::types::{CallbackSuccessResponse, OnboardingCallbackRequest};

#[derive(Debug)]
pub struct CallbackClient {
    base_url: Url,
    secret: SecretString,
    http: reqwest::Client,
}

impl CallbackClient {
    pub fn new(base_url: &str, secret: SecretString) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                message: "URL cannot serve as a base".to_string(),
            });
        }
        Ok(Self {
            base_url,
            secret,
            http: reqwest::Client::new(),
        })
    }

    /// Sign and deliver an onboarding-completion callback.
    ///
    /// `timestamp`/`request_id` default to now and a fresh UUID; pass the
    /// original values when retrying a delivery so the receiver's
    /// idempotency key stays stable.
    pub async fn complete_step(
        &self,
        partner_id: &str,
        step_id: &str,
        payload: &OnboardingCallbackRequest,
        timestamp: Option<i64>,
        request_id: Option<String>,
    ) -> Result<CallbackSuccessResponse, ClientError> {
        let path = format!("/api/v1/partners/{partner_id}/onboarding/{step_id}/complete");
        let url = self
            .base_url
            .join(&path)
            .map_err(|e| ClientError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                message: e.to_string(),
            })?;

        // The signature covers the exact bytes sent, so serialize once and
        // post the same string.
        let body = serde_json::to_string(payload)?;
        let headers = sign_callback(
            &self.secret,
            "POST",
            &path,
            body.as_bytes(),
            timestamp,
            request_id,
        );

        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, &headers.signature)
            .header(TIMESTAMP_HEADER, &headers.timestamp)
            .header(REQUEST_ID_HEADER, &headers.request_id)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<CallbackSuccessResponse>().await?)
    }
}
