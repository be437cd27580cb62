//! Think-time selection from clock state.

/// Hard ceiling on a single move's think time.
pub const MAX_THINK_MS: u64 = 10_000;

/// Choose how long to think given remaining clock time and increment, both
/// in milliseconds.
///
/// A fortieth of the remaining time, plus three quarters of the increment
/// when the clock comfortably covers it, floored by `min(50, 15%)` of the
/// remaining time and capped at [`MAX_THINK_MS`]. Negative remaining time
/// (unset or corrupt clock fields) yields the cap.
pub fn choose_think_time(remaining_ms: i64, increment_ms: i64) -> u64 {
    if remaining_ms < 0 {
        return MAX_THINK_MS;
    }

    let mut think = remaining_ms as f64 / 40.0;
    if remaining_ms > 2 * increment_ms {
        think += increment_ms as f64 * 0.75;
    }

    let floor = (remaining_ms as f64 * 0.15).min(50.0);
    (think.max(floor).ceil() as u64).min(MAX_THINK_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_minute_clock_thinks_seven_and_a_half_seconds() {
        assert_eq!(choose_think_time(300_000, 0), 7_500);
    }

    #[test]
    fn one_minute_clock() {
        assert_eq!(choose_think_time(60_000, 0), 1_500);
    }

    #[test]
    fn increment_is_added_when_covered() {
        // 60s + 2s increment: 1500 + 1500 = 3000.
        assert_eq!(choose_think_time(60_000, 2_000), 3_000);
    }

    #[test]
    fn increment_is_ignored_when_clock_is_low() {
        // 3s remaining with a 2s increment: remaining <= 2 * inc.
        assert_eq!(choose_think_time(3_000, 2_000), 75);
    }

    #[test]
    fn negative_remaining_hits_the_cap() {
        assert_eq!(choose_think_time(-1, 0), MAX_THINK_MS);
        assert_eq!(choose_think_time(-1, 5_000), MAX_THINK_MS);
    }

    #[test]
    fn huge_clock_is_capped() {
        assert_eq!(choose_think_time(10_000_000, 0), MAX_THINK_MS);
    }

    #[test]
    fn tiny_clock_uses_the_percentage_floor() {
        // 100ms remaining: think = 2.5, floor = min(50, 15) = 15.
        assert_eq!(choose_think_time(100, 0), 15);
    }
}
