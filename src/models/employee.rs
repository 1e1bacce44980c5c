use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::time_format::{hhmm, hhmm_opt};

/// Attendance marking state for a single employee-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Off,
    Unmarked,
}

impl AttendanceStatus {
    /// Parse a server-sourced status string. Only `present|absent|off` count
    /// as a saved status; anything else means "no status recorded".
    pub fn parse_saved(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Off => "off",
            Self::Unmarked => "unmarked",
        }
    }
}

/// Previously saved attendance snapshot carried on the roster record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentAttendance {
    pub status: Option<String>,
    #[serde(default, with = "hhmm_opt")]
    pub check_in: Option<NaiveTime>,
    #[serde(default, with = "hhmm_opt")]
    pub check_out: Option<NaiveTime>,
    pub ot_hours: Option<f64>,
    pub late_minutes: Option<i64>,
}

/// Server-sourced roster record. Immutable from the engine's perspective;
/// replaced wholesale by fetch/merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(with = "hhmm")]
    pub shift_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub shift_end: NaiveTime,
    #[serde(default)]
    pub has_off_day: bool,
    #[serde(default)]
    pub default_status: Option<String>,
    #[serde(default)]
    pub current_attendance: Option<CurrentAttendance>,
}

impl Employee {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_status_parsing_is_lenient() {
        assert_eq!(
            AttendanceStatus::parse_saved("Present"),
            Some(AttendanceStatus::Present)
        );
        assert_eq!(
            AttendanceStatus::parse_saved(" off "),
            Some(AttendanceStatus::Off)
        );
        assert_eq!(AttendanceStatus::parse_saved("unmarked"), None);
        assert_eq!(AttendanceStatus::parse_saved(""), None);
        assert_eq!(AttendanceStatus::parse_saved("pending"), None);
    }

    #[test]
    fn employee_deserializes_with_sparse_fields() {
        let emp: Employee = serde_json::from_str(
            r#"{
                "employee_id": 7,
                "first_name": "Rahim",
                "shift_start": "09:00",
                "shift_end": "18:00:00"
            }"#,
        )
        .unwrap();
        assert_eq!(emp.display_name(), "Rahim");
        assert!(!emp.has_off_day);
        assert!(emp.current_attendance.is_none());
        assert_eq!(emp.shift_end, NaiveTime::from_hms_opt(18, 0, 0).unwrap());
    }
}
