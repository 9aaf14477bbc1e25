use std::time::Duration;

/// Short human-readable duration: `850ms`, `4.2s`, `3m 07s`, `1h 02m 05s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, _) if duration < Duration::from_secs(1) => format!("{}ms", duration.as_millis()),
        (0, 0, _) => format!("{:.1}s", duration.as_secs_f64()),
        (0, m, s) => format!("{m}m {s:02}s"),
        (h, m, s) => format!("{h}h {m:02}m {s:02}s"),
    }
}

/// Size reduction in percent, or zero when nothing was read
pub fn reduction_percent(before: u64, after: u64) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (before as f64 - after as f64) / before as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(187)), "3m 07s");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "1h 02m 05s");
    }

    #[test]
    fn test_reduction_percent() {
        assert_eq!(reduction_percent(0, 10), 0.0);
        assert_eq!(reduction_percent(200, 50), 75.0);
        assert!(reduction_percent(100, 120) < 0.0);
    }
}
