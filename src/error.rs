use crate::models::Holiday;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("save rejected by server: {message}")]
    SaveRejected {
        message: String,
        holiday: Option<Holiday>,
    },

    #[error("attendance not marked for: {}", .0.join(", "))]
    UnmarkedEntries(Vec<String>),

    #[error("attendance for this date was already uploaded via Excel")]
    ExcelAlreadyUploaded,

    #[error("cannot save attendance on a holiday: {0}")]
    HolidayBlocked(String),

    #[error("no date selected")]
    NoDateSelected,

    #[error("unknown employee id {0}")]
    UnknownEmployee(i64),
}

pub type EngineResult<T> = Result<T, EngineError>;
