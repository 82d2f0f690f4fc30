use chrono::{DateTime, Utc};

/// Start of the epoch-aligned window containing `timestamp`.
///
/// Windows are fixed buckets, not sliding: hits one second apart can land
/// in different windows while hits `window_secs - 1` apart can share one.
pub fn window_start(timestamp: DateTime<Utc>, window_secs: u64) -> i64 {
    let window = window_secs as i64;
    timestamp.timestamp().div_euclid(window) * window
}

/// Deduplication key for a hit, or `None` when limiting is disabled.
///
/// The hit store holds a unique constraint on this key, so only the first
/// hit per `(ip, slug, window)` is kept.
pub fn rate_limit_key(
    ip: &str,
    slug: &str,
    timestamp: DateTime<Utc>,
    window_secs: u64,
) -> Option<String> {
    if window_secs == 0 {
        return None;
    }
    Some(format!(
        "{}|{}|{}",
        ip,
        slug,
        window_start(timestamp, window_secs)
    ))
}
