//! Attendance reconciliation and progressive synchronization engine for the
//! HR dashboard clients. Maintains per-employee daily attendance state,
//! derives default statuses from competing data sources, merges progressively
//! fetched rosters without discarding in-progress edits, and gates saves
//! behind holiday and Excel-upload checks.

mod api;
mod cache;
mod clock;
mod clock_math;
mod config;
mod display;
mod engine;
mod error;
mod events;
mod loader;
mod models;
mod save;
mod store;

pub use api::{AttendanceApi, HttpAttendanceApi};
pub use cache::{InFlightRegistry, RosterCache, RosterCacheEntry};
pub use clock::{Clock, SystemClock};
pub use clock_math::{late_minutes, minutes_of, ot_hours, round1};
pub use config::EngineConfig;
pub use display::{DisplayWindow, PacingStep};
pub use engine::{AttendanceEngine, LoadStatus};
pub use error::{EngineError, EngineResult};
pub use events::{DomainEvent, EventBus};
pub use loader::{BackgroundPlan, LoadOutcome};
pub use models::{
    AttendanceEntry, AttendanceStatus, CurrentAttendance, Employee, Holiday, HolidayResponse,
    PerformanceInfo, ProgressiveLoading, RecomputeRequest, RemainderResponse, RosterResponse,
    SaveRecord, SaveRequest, SaveResponse, ShadowTimes,
};
pub use save::SaveReport;
pub use store::AttendanceStore;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing for host binaries: env-filter with a crate-level
/// default, JSON output when `LOG_FORMAT=json`, human-readable otherwise.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()) == "json";

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,attendance_engine=debug".into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
