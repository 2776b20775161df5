//! Shared helpers for environment-based configuration resolution.

use crate::error::ConfigError;

/// Read an optional env var, treating unset and empty-after-trim as absent.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid unicode".to_string(),
        }),
    }
}

/// Read an optional boolean env var; accepts `true`/`1` (any case) as true.
pub(crate) fn optional_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    Ok(optional_env(key)?.map(|s| s.eq_ignore_ascii_case("true") || s == "1"))
}

/// Read an optional positive integer env var.
pub(crate) fn optional_env_positive(key: &str) -> Result<Option<i64>, ConfigError> {
    let Some(raw) = optional_env(key)? else {
        return Ok(None);
    };
    let value: i64 = raw.parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be an integer number of seconds: {e}"),
    })?;
    if value <= 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be > 0, got {value}"),
        });
    }
    Ok(Some(value))
}
