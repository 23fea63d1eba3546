//! Timing utilities for progress reporting
//!
//! Pure functions that can be tested without a running sync.

use std::time::Duration;

/// Format a duration compactly for progress lines ("1h5m", "4m10s", "12s")
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h{}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Items per second, or 0.0 if no time has elapsed
pub fn rate_per_second(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

/// Estimated time to process `remaining` items at `rate` items per second
///
/// Returns None when nothing remains or no rate is known yet.
pub fn estimate_remaining(remaining: usize, rate: f64) -> Option<Duration> {
    if remaining == 0 || rate <= 0.0 || !rate.is_finite() {
        return None;
    }
    Some(Duration::from_secs_f64(remaining as f64 / rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_seconds() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_millis(12_900)), "12s");
    }

    #[test]
    fn test_format_duration_minutes() {
        assert_eq!(format_duration(Duration::from_secs(250)), "4m10s");
    }

    #[test]
    fn test_format_duration_hours() {
        assert_eq!(format_duration(Duration::from_secs(3900)), "1h5m");
        assert_eq!(format_duration(Duration::from_secs(26 * 3600)), "26h0m");
    }

    #[test]
    fn test_rate_per_second() {
        assert_eq!(rate_per_second(10, Duration::from_secs(5)), 2.0);
        assert_eq!(rate_per_second(10, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_estimate_remaining() {
        assert_eq!(
            estimate_remaining(100, 2.0),
            Some(Duration::from_secs(50))
        );
        assert_eq!(estimate_remaining(0, 2.0), None);
        assert_eq!(estimate_remaining(100, 0.0), None);
    }
}
