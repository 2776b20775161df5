//! Replay window enforcement for signed requests.
//!
//! A valid signature only proves the request was produced by someone holding
//! the shared secret at some point; bounding the claimed timestamp to a small
//! drift window around the receiver's clock limits how long a captured
//! request stays replayable.

/// Default accepted drift window, tolerant of clock skew and network latency.
pub const DEFAULT_MAX_DRIFT_SECS: i64 = 300;

/// Why a request timestamp was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DriftError {
    #[error("timestamp is not a valid unix-seconds value")]
    InvalidFormat,

    /// Both exceeded variants render the same wording so the reason string
    /// does not tell a caller which direction their clock is off by more
    /// than the measured drift already does.
    #[error("drift exceeded: request is {drift}s outside the allowed window")]
    TooOld { drift: i64 },

    #[error("drift exceeded: request is {drift}s outside the allowed window")]
    TooNew { drift: i64 },
}

/// Check a raw timestamp header value against the receiver clock.
///
/// Accepts integer seconds first, then a finite float truncated to seconds,
/// matching the tolerant numeric parse of the wire contract. Returns the
/// measured signed drift (`now - ts`) on success so the caller can log it.
pub fn check_drift(raw_timestamp: &str, now: i64, max_drift_secs: i64) -> Result<i64, DriftError> {
    let ts = parse_timestamp(raw_timestamp)?;
    // Saturating: extreme caller-supplied timestamps must reject, not
    // overflow, and this runs before the signature is checked.
    let drift = now.saturating_sub(ts);
    if drift > max_drift_secs {
        return Err(DriftError::TooOld { drift });
    }
    if drift.saturating_neg() > max_drift_secs {
        return Err(DriftError::TooNew { drift });
    }
    Ok(drift)
}

fn parse_timestamp(raw: &str) -> Result<i64, DriftError> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Ok(secs);
    }
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() => Ok(secs.trunc() as i64),
        _ => Err(DriftError::InvalidFormat),
    }
}
