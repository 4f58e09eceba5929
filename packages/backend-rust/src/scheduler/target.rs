use super::round_half_up;

pub const SHORT_SESSION_MINUTES: i32 = 5;
pub const LONG_SESSION_MINUTES: i32 = 20;
pub const MIN_SHRUNK_TARGET: i64 = 5;
pub const MAX_GROWN_TARGET: i64 = 80;

const SHRINK_FACTOR: f64 = 0.8;
const GROW_FACTOR: f64 = 1.1;

/// Single-step nudge of the requested daily target from the trailing-week average session length.
pub fn adjust_daily_target(requested: i64, avg_session_minutes: Option<i32>) -> i64 {
    let Some(avg) = avg_session_minutes else {
        return requested;
    };

    if avg < SHORT_SESSION_MINUTES {
        return round_half_up(requested as f64 * SHRINK_FACTOR).max(MIN_SHRUNK_TARGET);
    }
    if avg > LONG_SESSION_MINUTES {
        return round_half_up(requested as f64 * GROW_FACTOR).min(MAX_GROWN_TARGET);
    }
    requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sessions_keeps_request() {
        assert_eq!(adjust_daily_target(30, None), 30);
    }

    #[test]
    fn test_short_sessions_shrink_with_floor() {
        assert_eq!(adjust_daily_target(30, Some(3)), 24);
        assert_eq!(adjust_daily_target(4, Some(1)), 5);
    }

    #[test]
    fn test_long_sessions_grow_with_cap() {
        assert_eq!(adjust_daily_target(30, Some(25)), 33);
        assert_eq!(adjust_daily_target(5, Some(21)), 6);
        assert_eq!(adjust_daily_target(78, Some(40)), 80);
    }

    #[test]
    fn test_mid_range_unchanged() {
        assert_eq!(adjust_daily_target(30, Some(5)), 30);
        assert_eq!(adjust_daily_target(30, Some(20)), 30);
    }
}
