use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::employee::Employee;

/// Server-side timing detail attached to roster responses. Logged only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceInfo {
    pub query_time: f64,
}

/// Progressive-loading hints on the initial roster response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveLoading {
    pub has_more: bool,
    #[serde(default)]
    pub auto_trigger_remaining: bool,
    #[serde(default)]
    pub remaining_employees: usize,
    #[serde(default)]
    pub recommended_delay_ms: u64,
}

/// Response to the initial roster fetch for a date.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterResponse {
    #[serde(default)]
    pub eligible_employees: Vec<Employee>,
    pub total_count: usize,
    #[serde(default)]
    pub day_name: String,
    #[serde(default)]
    pub has_excel_attendance: bool,
    #[serde(default)]
    pub performance: Option<PerformanceInfo>,
    #[serde(default)]
    pub progressive_loading: Option<ProgressiveLoading>,
}

/// Response to the remainder fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct RemainderResponse {
    #[serde(default)]
    pub eligible_employees: Vec<Employee>,
    pub total_count: usize,
    #[serde(default)]
    pub performance: Option<PerformanceInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayResponse {
    pub is_holiday: bool,
    #[serde(default)]
    pub holiday: Option<Holiday>,
}

/// One row of the bulk attendance update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub employee_id: i64,
    pub name: String,
    pub department: Option<String>,
    pub date: NaiveDate,
    pub status: String,
    pub present_days: u32,
    pub absent_days: u32,
    pub ot_hours: f64,
    pub late_minutes: i64,
    pub calendar_days: u32,
    pub total_working_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    pub date: NaiveDate,
    pub attendance_records: Vec<SaveRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub message: String,
}

/// Detached monthly-summary recompute request issued after a save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeRequest {
    pub date: NaiveDate,
    pub employee_ids: Vec<i64>,
}

/// Error body the save endpoint returns on rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub holiday: Option<Holiday>,
}
