use chrono::{Local, NaiveDateTime, Utc};

/// Local wall-clock time, swappable so time-of-day logic can be driven in tests.
pub trait Clock: Send + Sync {
    fn local_now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

pub fn now_epoch_seconds() -> i64 {
    Utc::now().timestamp()
}

pub fn now_epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Whole seconds between `start_epoch_seconds` and `now_epoch_millis`, rounded
/// to the nearest second and clamped at zero.
pub fn elapsed_since(start_epoch_seconds: i64, now_epoch_millis: i64) -> u64 {
    let delta_ms = now_epoch_millis.saturating_sub(start_epoch_seconds.saturating_mul(1000));
    if delta_ms <= 0 {
        return 0;
    }
    ((delta_ms + 500) / 1000) as u64
}

/// Formats seconds as `HH:MM:SS`. Hours keep growing past 99.
pub fn format_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_clock_text() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(3), "00:00:03");
        assert_eq!(format_hms(3_725), "01:02:05");
        assert_eq!(format_hms(360_000), "100:00:00");
    }

    #[test]
    fn elapsed_rounds_to_nearest_second() {
        let start = 1_700_000_000;
        assert_eq!(elapsed_since(start, start * 1000 + 1_499), 1);
        assert_eq!(elapsed_since(start, start * 1000 + 1_500), 2);
        assert_eq!(elapsed_since(start, start * 1000 + 90_200), 90);
    }

    #[test]
    fn elapsed_clamps_future_start_to_zero() {
        let start = 1_700_000_000;
        assert_eq!(elapsed_since(start, start * 1000 - 4_000), 0);
    }
}
