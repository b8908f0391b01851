use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch, as stamped on every telemetry item.
///
/// A clock set before 1970 reads as zero rather than failing.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
