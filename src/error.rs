//! Error types for the GrantBridge callback gateway.

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Gateway failed to start: {reason}")]
    StartupFailed { reason: String },
}

/// Service-to-service authentication failures.
///
/// Reason strings are deliberately coarse: specific enough for a legitimate
/// internal caller to self-diagnose (missing header vs drift vs signature),
/// but never revealing which part of the signature comparison failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing X-Service-Auth signature header")]
    MissingSignature,

    #[error("missing X-Service-Timestamp header")]
    MissingTimestamp,

    #[error("invalid X-Service-Timestamp header")]
    InvalidTimestamp,

    #[error("timestamp drift exceeded: {drift}s outside the {max_drift}s window")]
    DriftExceeded { drift: i64, max_drift: i64 },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("request body could not be read: {0}")]
    BodyRead(String),
}

/// Outbound signed-callback client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid callback base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("failed to serialize callback payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("callback rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
