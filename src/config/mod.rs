//! Configuration for the callback gateway.
//!
//! All settings resolve from environment variables (loaded from `.env` via
//! dotenvy early in startup). The shared signing secret is the one required
//! value: refusing to start without it is deliberate, so the gateway never
//! silently falls back to an unauthenticated or guessable-secret mode.

pub(crate) mod helpers;

use secrecy::SecretString;

use crate::auth::replay::DEFAULT_MAX_DRIFT_SECS;
use crate::error::ConfigError;
use crate::idempotency::DEFAULT_TTL_SECS;
use helpers::{optional_env, optional_env_bool, optional_env_positive};

/// Default path prefix guarded by the service auth gate.
pub const DEFAULT_PROTECTED_PREFIX: &str = "/api/v1/";

/// Main configuration for the gateway.
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: ServiceAuthConfig,
    pub idempotency: IdempotencyConfig,
    /// Advisory latency threshold for callback handling, in milliseconds.
    pub callback_latency_warn_ms: u64,
}

/// Bind address for the HTTP server.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Service-to-service auth gate settings.
#[derive(Debug, Clone)]
pub struct ServiceAuthConfig {
    /// Shared signing secret. `None` only when `disabled` is true.
    pub secret: Option<SecretString>,
    /// Explicit opt-out, never the silent default.
    pub disabled: bool,
    pub max_drift_secs: i64,
    /// Path prefixes the gate protects; everything else passes through.
    pub protected_prefixes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    pub ttl_secs: i64,
}

impl Config {
    /// Resolve configuration from the environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let disabled = optional_env_bool("SERVICE_AUTH_DISABLED")?.unwrap_or(false);
        let secret = optional_env("SERVICE_AUTH_SECRET")?.map(SecretString::from);
        if secret.is_none() && !disabled {
            return Err(ConfigError::MissingRequired {
                key: "SERVICE_AUTH_SECRET".to_string(),
                hint: "Set SERVICE_AUTH_SECRET to the shared signing secret provisioned to \
                       calling services, or set SERVICE_AUTH_DISABLED=true to run the gateway \
                       without service auth (local development only)."
                    .to_string(),
            });
        }

        let max_drift_secs =
            optional_env_positive("SERVICE_AUTH_MAX_DRIFT_SECS")?.unwrap_or(DEFAULT_MAX_DRIFT_SECS);
        let ttl_secs = optional_env_positive("IDEMPOTENCY_TTL_SECS")?.unwrap_or(DEFAULT_TTL_SECS);

        let protected_prefixes = optional_env("PROTECTED_PATH_PREFIXES")?
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|prefixes| !prefixes.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_PROTECTED_PREFIX.to_string()]);

        let host = optional_env("GATEWAY_HOST")?.unwrap_or_else(|| "127.0.0.1".to_string());
        let port = optional_env("GATEWAY_PORT")?
            .map(|s| s.parse())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "GATEWAY_PORT".to_string(),
                message: format!("must be a valid port number: {e}"),
            })?
            .unwrap_or(8088);

        let callback_latency_warn_ms = optional_env("CALLBACK_LATENCY_WARN_MS")?
            .map(|s| s.parse())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CALLBACK_LATENCY_WARN_MS".to_string(),
                message: format!("must be a millisecond count: {e}"),
            })?
            .unwrap_or(120);

        Ok(Self {
            gateway: GatewayConfig { host, port },
            auth: ServiceAuthConfig {
                secret,
                disabled,
                max_drift_secs,
                protected_prefixes,
            },
            idempotency: IdempotencyConfig { ttl_secs },
            callback_latency_warn_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// Env-mutating tests share the process environment; serialize them.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ALL_KEYS: [&str; 8] = [
        "SERVICE_AUTH_SECRET",
        "SERVICE_AUTH_DISABLED",
        "SERVICE_AUTH_MAX_DRIFT_SECS",
        "IDEMPOTENCY_TTL_SECS",
        "PROTECTED_PATH_PREFIXES",
        "GATEWAY_HOST",
        "GATEWAY_PORT",
        "CALLBACK_LATENCY_WARN_MS",
    ];

    fn clean_env() -> MutexGuard<'static, ()> {
        let guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for key in ALL_KEYS {
            unsafe { std::env::remove_var(key) };
        }
        guard
    }

    #[test]
    fn missing_secret_is_fatal() {
        let _guard = clean_env();
        let err = Config::resolve().expect_err("no secret configured");
        match err {
            ConfigError::MissingRequired { key, .. } => assert_eq!(key, "SERVICE_AUTH_SECRET"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn defaults_apply_when_secret_present() {
        let _guard = clean_env();
        unsafe { std::env::set_var("SERVICE_AUTH_SECRET", "s3cret") };
        let config = Config::resolve().expect("valid config");
        assert!(!config.auth.disabled);
        assert_eq!(config.auth.max_drift_secs, 300);
        assert_eq!(config.idempotency.ttl_secs, 86_400);
        assert_eq!(config.auth.protected_prefixes, vec!["/api/v1/"]);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 8088);
        assert_eq!(config.callback_latency_warn_ms, 120);
    }

    #[test]
    fn explicit_disabled_mode_allows_missing_secret() {
        let _guard = clean_env();
        unsafe { std::env::set_var("SERVICE_AUTH_DISABLED", "true") };
        let config = Config::resolve().expect("disabled mode");
        assert!(config.auth.disabled);
        assert!(config.auth.secret.is_none());
    }

    #[test]
    fn overrides_and_prefix_list_are_honored() {
        let _guard = clean_env();
        unsafe {
            std::env::set_var("SERVICE_AUTH_SECRET", "s3cret");
            std::env::set_var("SERVICE_AUTH_MAX_DRIFT_SECS", "60");
            std::env::set_var("IDEMPOTENCY_TTL_SECS", "3600");
            std::env::set_var("PROTECTED_PATH_PREFIXES", "/api/v1/, /internal/");
            std::env::set_var("GATEWAY_PORT", "9100");
        }
        let config = Config::resolve().expect("valid config");
        assert_eq!(config.auth.max_drift_secs, 60);
        assert_eq!(config.idempotency.ttl_secs, 3600);
        assert_eq!(config.auth.protected_prefixes, vec!["/api/v1/", "/internal/"]);
        assert_eq!(config.gateway.port, 9100);
    }

    #[test]
    fn invalid_numeric_values_name_the_key() {
        let _guard = clean_env();
        unsafe {
            std::env::set_var("SERVICE_AUTH_SECRET", "s3cret");
            std::env::set_var("SERVICE_AUTH_MAX_DRIFT_SECS", "-5");
        }
        match Config::resolve().expect_err("negative drift") {
            ConfigError::InvalidValue { key, .. } => {
                assert_eq!(key, "SERVICE_AUTH_MAX_DRIFT_SECS");
            }
            other => panic!("unexpected error: {other}"),
        }

        unsafe {
            std::env::set_var("SERVICE_AUTH_MAX_DRIFT_SECS", "300");
            std::env::set_var("IDEMPOTENCY_TTL_SECS", "soon");
        }
        match Config::resolve().expect_err("non-numeric ttl") {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "IDEMPOTENCY_TTL_SECS"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dotenv_file_feeds_resolution() {
        let _guard = clean_env();
        let dir = tempfile::tempdir().expect("tempdir");
        let env_path = dir.path().join(".env");
        std::fs::write(
            &env_path,
            "SERVICE_AUTH_SECRET=from-dotenv\nGATEWAY_PORT=9200\n",
        )
        .expect("write env file");

        dotenvy::from_path(&env_path).expect("load env file");
        let config = Config::resolve().expect("valid config");
        assert_eq!(config.gateway.port, 9200);
        assert!(config.auth.secret.is_some());
    }
}
