pub mod employee;
pub mod entry;
pub mod time_format;
pub mod wire;

pub use employee::{AttendanceStatus, CurrentAttendance, Employee};
pub use entry::{AttendanceEntry, ShadowTimes};
pub use wire::{
    Holiday, HolidayResponse, PerformanceInfo, ProgressiveLoading, RecomputeRequest,
    RemainderResponse, RosterResponse, SaveErrorBody, SaveRecord, SaveRequest, SaveResponse,
};
