//! Time-bounded idempotency store for callback deliveries.
//!
//! The store maps a derived idempotency key to the success response returned
//! the first time a logically identical callback was processed. Retries hit
//! the cached record and are invisible to both the caller and the partner
//! directory.
//!
//! One store instance guards one process. The mutex-per-store discipline is
//! a single-instance simplification: horizontally scaled deployments need a
//! shared backend with conditional-put semantics instead, because two
//! gateway instances would otherwise each see a fresh key and double-apply
//! the completion effect.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, MutexGuard};

/// Default record lifetime: one day.
pub const DEFAULT_TTL_SECS: i64 = 86_400;

/// Derive the idempotency key for a callback delivery.
///
/// The key covers partner, step, and completion timestamp plus the caller's
/// request id. Including the request id is deliberate hardening: without it,
/// an attacker replaying a captured signed request under a forged timestamp
/// header could dodge the natural-key dedup while still landing inside the
/// drift window.
pub fn derive_idempotency_key(
    partner_id: &str,
    step_id: &str,
    completed_at: &str,
    request_id: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(partner_id.as_bytes());
    hasher.update(b":");
    hasher.update(step_id.as_bytes());
    hasher.update(b":");
    hasher.update(completed_at.as_bytes());
    hasher.update(b":");
    hasher.update(request_id.as_bytes());
    let digest = hasher.finalize();

    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

/// A processed callback and the exact response it produced.
///
/// Records are immutable once created and evicted when their TTL elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub partner_id: String,
    pub step_id: String,
    pub completed_at: String,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    /// Serialized success body returned on first processing; replays return
    /// this string verbatim so responses stay byte-identical.
    pub response_body: String,
}

/// Injectable, mutex-guarded idempotency cache.
pub struct IdempotencyStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl IdempotencyStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Enter the store's critical section.
    ///
    /// The returned guard holds the store lock; a handler performs its
    /// get-check-put sequence (including the downstream completion await)
    /// while holding it, which serializes concurrent retries of the same
    /// delivery. Traffic on this endpoint is low enough that serializing
    /// all callbacks through one lock is acceptable.
    pub async fn begin(&self) -> IdempotencySection<'_> {
        IdempotencySection {
            ttl: self.ttl,
            entries: self.entries.lock().await,
        }
    }
}

/// Exclusive access to the store for one get-check-put sequence.
pub struct IdempotencySection<'a> {
    ttl: Duration,
    entries: MutexGuard<'a, HashMap<String, IdempotencyRecord>>,
}

impl IdempotencySection<'_> {
    /// Look up a live record, lazily purging expired entries first.
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<&IdempotencyRecord> {
        self.purge_expired(now);
        self.entries.get(key)
    }

    /// Insert a freshly created record.
    ///
    /// Overwriting a live key is a logic error; callers must check `get`
    /// within the same section first.
    pub fn put(&mut self, key: String, record: IdempotencyRecord) {
        debug_assert!(!self.entries.contains_key(&key), "live idempotency key overwritten");
        self.entries.insert(key, record);
    }

    /// Drop every record whose TTL has elapsed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, record| now <= record.created_at + ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
