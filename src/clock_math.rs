//! Pure clock arithmetic for lateness and overtime. No state, no I/O.

use chrono::{Duration, NaiveTime, Timelike};

/// Minutes since midnight.
pub fn minutes_of(t: NaiveTime) -> i64 {
    i64::from(t.hour()) * 60 + i64::from(t.minute())
}

/// Minutes late relative to the shift start. Early arrivals are 0, not
/// negative.
pub fn late_minutes(clock_in: NaiveTime, shift_start: NaiveTime) -> i64 {
    (minutes_of(clock_in) - minutes_of(shift_start)).max(0)
}

/// Overtime hours past the shift end, rounded to one fractional digit.
pub fn ot_hours(clock_out: NaiveTime, shift_end: NaiveTime) -> f64 {
    let minutes = (minutes_of(clock_out) - minutes_of(shift_end)).max(0);
    round1(minutes as f64 / 60.0)
}

/// Round to one decimal place, half away from zero.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Cosmetic default clock-in when no saved time exists: shift start pushed by
/// the recorded lateness.
pub fn default_clock_in(shift_start: NaiveTime, late_minutes: i64) -> NaiveTime {
    shift_start + Duration::minutes(late_minutes)
}

/// Cosmetic default clock-out: shift end pushed by the recorded overtime.
pub fn default_clock_out(shift_end: NaiveTime, ot_hours: f64) -> NaiveTime {
    shift_end + Duration::minutes((ot_hours * 60.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn late_arrival_counts_from_shift_start() {
        assert_eq!(late_minutes(t(9, 20), t(9, 0)), 20);
    }

    #[test]
    fn early_arrival_is_not_negative_lateness() {
        assert_eq!(late_minutes(t(8, 45), t(9, 0)), 0);
    }

    #[test]
    fn overtime_rounds_to_one_decimal() {
        // 75 minutes past 18:00 is 1.25h; one fractional digit rounds up.
        assert_eq!(ot_hours(t(19, 15), t(18, 0)), 1.3);
        assert_eq!(ot_hours(t(19, 0), t(18, 0)), 1.0);
        assert_eq!(ot_hours(t(18, 30), t(18, 0)), 0.5);
    }

    #[test]
    fn leaving_before_shift_end_is_zero_overtime() {
        assert_eq!(ot_hours(t(17, 30), t(18, 0)), 0.0);
    }

    #[test]
    fn cosmetic_defaults_offset_the_shift_times() {
        assert_eq!(default_clock_in(t(9, 0), 20), t(9, 20));
        assert_eq!(default_clock_out(t(18, 0), 1.5), t(19, 30));
        assert_eq!(default_clock_out(t(18, 0), 0.0), t(18, 0));
    }
}
