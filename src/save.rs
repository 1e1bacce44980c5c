//! Save orchestration: local gates, validation, the bulk update call, and the
//! detached monthly-summary recompute.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tokio::sync::oneshot;

use crate::api::AttendanceApi;
use crate::engine::AttendanceEngine;
use crate::error::{EngineError, EngineResult};
use crate::events::DomainEvent;
use crate::models::{
    AttendanceEntry, AttendanceStatus, HolidayResponse, RecomputeRequest, SaveRecord, SaveRequest,
};

/// Result of a successful save. The recompute channel reports the detached
/// summary task's outcome for observability; the save itself never waits on
/// it.
#[derive(Debug)]
pub struct SaveReport {
    pub message: String,
    pub recompute: oneshot::Receiver<EngineResult<()>>,
}

impl<A: AttendanceApi + 'static> AttendanceEngine<A> {
    /// Holiday gate lookup, cached for an hour.
    pub async fn holiday_status(&self, date: NaiveDate) -> EngineResult<HolidayResponse> {
        if let Some(cached) = self.holidays.get(&date).await {
            return Ok(cached);
        }
        let response = self.api.check_holiday(date).await?;
        self.holidays.insert(date, response.clone()).await;
        Ok(response)
    }

    /// Persist the working set. Blocks locally, without a network call, when
    /// the Excel gate is up, the date is a holiday, or any entry is still
    /// unmarked.
    pub async fn save(&self) -> EngineResult<SaveReport> {
        let (date, records, employee_ids) = {
            let st = self.state.lock().unwrap();
            let date = st.date.ok_or(EngineError::NoDateSelected)?;
            if st.has_excel_flag {
                return Err(EngineError::ExcelAlreadyUploaded);
            }
            let unmarked = st.store.unmarked_names();
            if !unmarked.is_empty() {
                return Err(EngineError::UnmarkedEntries(unmarked));
            }
            let records: Vec<SaveRecord> = st
                .store
                .iter_ordered()
                .map(|entry| save_record(entry, date))
                .collect();
            let ids: Vec<i64> = st.store.iter_ordered().map(|e| e.employee_id).collect();
            (date, records, ids)
        };

        let holiday = self.holiday_status(date).await?;
        if holiday.is_holiday {
            let name = holiday
                .holiday
                .map(|h| h.name)
                .unwrap_or_else(|| "holiday".to_string());
            return Err(EngineError::HolidayBlocked(name));
        }

        let request = SaveRequest {
            date,
            attendance_records: records,
        };
        let response = match self.api.save_attendance(&request).await {
            Ok(response) => response,
            Err(EngineError::SaveRejected {
                message,
                holiday: Some(holiday),
            }) => {
                // The client-side gate was stale: adopt the server's holiday
                // verdict so the next attempt is blocked locally.
                tracing::warn!(%date, message, holiday = holiday.name, "server holiday rejection, correcting local gate");
                self.holidays
                    .insert(
                        date,
                        HolidayResponse {
                            is_holiday: true,
                            holiday: Some(holiday.clone()),
                        },
                    )
                    .await;
                return Err(EngineError::HolidayBlocked(holiday.name));
            }
            Err(e) => return Err(e),
        };

        tracing::info!(%date, records = request.attendance_records.len(), "attendance saved");
        self.events.publish(DomainEvent::AttendanceUpdated);
        self.events.publish(DomainEvent::RefreshEmployeeData);

        let recompute = self.spawn_recompute(RecomputeRequest { date, employee_ids });
        Ok(SaveReport {
            message: response.message,
            recompute,
        })
    }

    /// Fire the monthly-summary recompute detached. Its failure is logged and
    /// reported on the channel but never rolls back the save.
    fn spawn_recompute(
        &self,
        request: RecomputeRequest,
    ) -> oneshot::Receiver<EngineResult<()>> {
        let (tx, rx) = oneshot::channel();
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            let result = api.recompute_summaries(&request).await;
            match &result {
                Ok(()) => tracing::debug!(date = %request.date, "summary recompute requested"),
                Err(e) => {
                    tracing::warn!(date = %request.date, error = %e, "detached summary recompute failed")
                }
            }
            let _ = tx.send(result);
        });
        rx
    }
}

fn save_record(entry: &AttendanceEntry, date: NaiveDate) -> SaveRecord {
    let calendar_days = days_in_month(date);
    // Off-day entries are never committed as absent.
    let status = if entry.has_off_day && entry.status == AttendanceStatus::Absent {
        AttendanceStatus::Off
    } else {
        entry.status
    };
    SaveRecord {
        employee_id: entry.employee_id,
        name: entry.name.clone(),
        department: entry.department.clone(),
        date,
        status: status.as_str().to_string(),
        present_days: u32::from(status == AttendanceStatus::Present),
        absent_days: u32::from(status == AttendanceStatus::Absent),
        ot_hours: entry.ot_hours,
        late_minutes: entry.late_minutes,
        calendar_days,
        total_working_days: calendar_days - u32::from(entry.has_off_day),
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let next_month = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    match next_month.and_then(|d| d.pred_opt()) {
        Some(last_day) => last_day.day(),
        None => 30,
    }
}
