use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    HolidayResponse, RecomputeRequest, RemainderResponse, RosterResponse, SaveErrorBody,
    SaveRequest, SaveResponse,
};

/// Remote attendance API. Trait seam so the engine can be driven against a
/// mock in tests.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// Initial bounded roster batch for a date.
    async fn fetch_roster_initial(&self, date: NaiveDate) -> EngineResult<RosterResponse>;

    /// Remainder of the roster after a progressive initial batch.
    async fn fetch_roster_remaining(&self, date: NaiveDate) -> EngineResult<RemainderResponse>;

    async fn check_holiday(&self, date: NaiveDate) -> EngineResult<HolidayResponse>;

    /// Bulk attendance update for every marked entry.
    async fn save_attendance(&self, request: &SaveRequest) -> EngineResult<SaveResponse>;

    /// Monthly summary recompute, issued detached after a successful save.
    async fn recompute_summaries(&self, request: &RecomputeRequest) -> EngineResult<()>;
}

/// reqwest-backed implementation talking to the dashboard backend.
pub struct HttpAttendanceApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAttendanceApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check_status(response: reqwest::Response) -> EngineResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, message, "attendance API returned error");
        Err(EngineError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AttendanceApi for HttpAttendanceApi {
    async fn fetch_roster_initial(&self, date: NaiveDate) -> EngineResult<RosterResponse> {
        tracing::debug!(%date, "fetching initial roster batch");
        let response = self
            .client
            .get(self.url("/api/attendance/eligible-employees"))
            .query(&[("date", date.to_string()), ("initial", "true".to_string())])
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: RosterResponse = response.json().await?;

        if let Some(perf) = &body.performance {
            tracing::debug!(%date, query_time = perf.query_time, "roster query timing");
        }
        Ok(body)
    }

    async fn fetch_roster_remaining(&self, date: NaiveDate) -> EngineResult<RemainderResponse> {
        tracing::debug!(%date, "fetching remaining roster");
        let response = self
            .client
            .get(self.url("/api/attendance/eligible-employees"))
            .query(&[("date", date.to_string()), ("remaining", "true".to_string())])
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn check_holiday(&self, date: NaiveDate) -> EngineResult<HolidayResponse> {
        let response = self
            .client
            .get(self.url("/api/holidays/check"))
            .query(&[("date", date.to_string())])
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn save_attendance(&self, request: &SaveRequest) -> EngineResult<SaveResponse> {
        let response = self
            .client
            .post(self.url("/api/attendance/bulk-update"))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            // Rejections carry a structured body; the holiday payload (if
            // any) lets the caller correct a stale local gate.
            let status = response.status();
            let raw = response.text().await.unwrap_or_default();
            let body: SaveErrorBody = serde_json::from_str(&raw).unwrap_or(SaveErrorBody {
                error: raw.clone(),
                holiday: None,
            });
            tracing::error!(status = %status, message = body.error, "bulk update rejected");
            return Err(EngineError::SaveRejected {
                message: body.error,
                holiday: body.holiday,
            });
        }
        Ok(response.json().await?)
    }

    async fn recompute_summaries(&self, request: &RecomputeRequest) -> EngineResult<()> {
        let response = self
            .client
            .post(self.url("/api/attendance/recompute-summary"))
            .json(request)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}
