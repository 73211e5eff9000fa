use chrono::{DateTime, Utc};

/// Whole seconds between `now` and the auction end. Negative once the
/// auction has expired; callers decide how to treat the boundary.
pub fn seconds_remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (end - now).num_seconds()
}

/// True once the auction end time has been reached or passed.
pub fn has_ended(end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    seconds_remaining(end, now) <= 0
}

/// Fraction of the auction already elapsed, clamped to [0, 1].
///
/// `total_secs` is the assumed full duration; callers must have validated it
/// as positive, but a degenerate value still yields a safe 0.0 here.
pub fn elapsed_fraction(total_secs: i64, remaining_secs: i64) -> f64 {
    if total_secs <= 0 {
        return 0.0;
    }
    let remaining = remaining_secs.clamp(0, total_secs);
    1.0 - remaining as f64 / total_secs as f64
}
