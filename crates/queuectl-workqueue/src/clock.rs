//! Time helpers for leases.

use chrono::{DateTime, Duration, Utc};

/// Current wall-clock time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Age of a lease taken at `locked_at`, never negative.
pub fn lease_age(locked_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - locked_at).max(Duration::zero())
}

/// A lease is stale once its age strictly exceeds the timeout.
pub fn lease_expired(locked_at: DateTime<Utc>, now: DateTime<Utc>, timeout_secs: u64) -> bool {
    let timeout = i64::try_from(timeout_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    lease_age(locked_at, now) > timeout
}
