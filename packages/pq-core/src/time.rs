//! Wall-clock helpers shared by the replica and the client.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as milliseconds since the Unix epoch.
///
/// Millisecond timestamps fit comfortably in `i64` until the year 292
/// million, so the truncation from `u128` is never lossy in practice.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_positive_and_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(a > 0);
        assert!(b >= a);
    }
}
