//! Wall-clock helpers.

use chrono::Utc;

/// Current time as unix seconds with sub-second precision.
pub fn unix_timestamp() -> f64 {
    let now = Utc::now();
    #[allow(clippy::cast_precision_loss)]
    let millis = now.timestamp_millis() as f64;
    millis / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_recent_and_fractional() {
        let a = unix_timestamp();
        let b = unix_timestamp();
        // 2020-01-01
        assert!(a > 1_577_836_800.0);
        assert!(b >= a);
    }
}
