use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::employee::{AttendanceStatus, CurrentAttendance, Employee};
use super::time_format::hhmm_opt;
use crate::clock_math;

/// Clock/overtime values stashed when an entry leaves `present`, restored if
/// it comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowTimes {
    #[serde(with = "hhmm_opt")]
    pub clock_in: Option<NaiveTime>,
    #[serde(with = "hhmm_opt")]
    pub clock_out: Option<NaiveTime>,
    pub ot_hours: f64,
    pub late_minutes: i64,
}

/// Mutable per-employee working state for the selected date. Created once per
/// employee per date, mutated only by explicit user actions, wiped wholesale
/// on date change or invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub employee_id: i64,
    pub name: String,
    pub department: Option<String>,
    pub status: AttendanceStatus,
    #[serde(with = "hhmm_opt")]
    pub clock_in: Option<NaiveTime>,
    #[serde(with = "hhmm_opt")]
    pub clock_out: Option<NaiveTime>,
    pub ot_hours: f64,
    pub late_minutes: i64,
    pub has_off_day: bool,
    #[serde(default)]
    shadow: Option<ShadowTimes>,
    // Shift times carried from the roster record for recomputation.
    pub shift_start: NaiveTime,
    pub shift_end: NaiveTime,
}

impl AttendanceEntry {
    /// Baseline entry for a roster record: unmarked, clock times defaulted to
    /// the shift boundaries, zero overtime and lateness.
    pub fn base(emp: &Employee) -> Self {
        Self {
            employee_id: emp.employee_id,
            name: emp.display_name(),
            department: emp.department.clone(),
            status: AttendanceStatus::Unmarked,
            clock_in: Some(emp.shift_start),
            clock_out: Some(emp.shift_end),
            ot_hours: 0.0,
            late_minutes: 0,
            has_off_day: emp.has_off_day,
            shadow: None,
            shift_start: emp.shift_start,
            shift_end: emp.shift_end,
        }
    }

    /// Overlay numeric/clock detail from a backend-saved snapshot. Missing
    /// clock times fall back to the cosmetic defaults derived from the shift.
    pub fn apply_saved_detail(&mut self, saved: &CurrentAttendance) {
        if let Some(late) = saved.late_minutes {
            self.late_minutes = late;
        }
        if let Some(ot) = saved.ot_hours {
            self.ot_hours = clock_math::round1(ot);
        }
        self.clock_in = saved
            .check_in
            .or_else(|| Some(clock_math::default_clock_in(self.shift_start, self.late_minutes)));
        self.clock_out = saved
            .check_out
            .or_else(|| Some(clock_math::default_clock_out(self.shift_end, self.ot_hours)));
    }

    /// Move to `next`, applying the shadow-field discipline: leaving `present`
    /// stashes the current clock detail and resets to shift defaults;
    /// re-entering `present` restores the stash when one exists.
    pub fn transition(&mut self, next: AttendanceStatus) {
        if self.status == next {
            return;
        }

        if self.status == AttendanceStatus::Present {
            self.shadow = Some(ShadowTimes {
                clock_in: self.clock_in,
                clock_out: self.clock_out,
                ot_hours: self.ot_hours,
                late_minutes: self.late_minutes,
            });
            self.clock_in = Some(self.shift_start);
            self.clock_out = Some(self.shift_end);
            self.ot_hours = 0.0;
            self.late_minutes = 0;
        }

        if next == AttendanceStatus::Present {
            if let Some(prev) = self.shadow.take() {
                self.clock_in = prev.clock_in;
                self.clock_out = prev.clock_out;
                self.ot_hours = prev.ot_hours;
                self.late_minutes = prev.late_minutes;
            }
        }

        self.status = next;
    }

    /// Record a clock-in edit. Only meaningful while present; recomputes
    /// lateness from the shift start.
    pub fn set_clock_in(&mut self, t: NaiveTime) {
        if self.status != AttendanceStatus::Present {
            return;
        }
        self.clock_in = Some(t);
        self.late_minutes = clock_math::late_minutes(t, self.shift_start);
    }

    /// Record a clock-out edit. Only meaningful while present; recomputes
    /// overtime from the shift end.
    pub fn set_clock_out(&mut self, t: NaiveTime) {
        if self.status != AttendanceStatus::Present {
            return;
        }
        self.clock_out = Some(t);
        self.ot_hours = clock_math::ot_hours(t, self.shift_end);
    }

    pub fn has_shadow(&self) -> bool {
        self.shadow.is_some()
    }
}
