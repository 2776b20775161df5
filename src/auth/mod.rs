//! Service-to-service request authentication primitives.
//!
//! Two stateless pieces compose into the gate applied by the web layer:
//! [`signature`] binds a request's identity to the shared secret with
//! HMAC-SHA256, and [`replay`] bounds how old an accepted request may be.

pub mod replay;
pub mod signature;

pub use replay::{DEFAULT_MAX_DRIFT_SECS, DriftError, check_drift};
pub use signature::{
    REQUEST_ID_HEADER, SIGNATURE_HEADER, SignedCallbackHeaders, TIMESTAMP_HEADER,
    compute_signature, sign_callback, verify_signature,
};
