use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use moka::future::Cache;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::api::AttendanceApi;
use crate::cache::{build_holiday_cache, InFlightRegistry, RosterCache};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::display::DisplayWindow;
use crate::error::{EngineError, EngineResult};
use crate::events::{DomainEvent, EventBus};
use crate::models::{AttendanceEntry, AttendanceStatus, Employee, HolidayResponse};
use crate::store::AttendanceStore;

/// Load progress for the selected date.
#[derive(Debug, Default)]
pub(crate) struct LoadProgress {
    pub complete: bool,
    pub has_more: bool,
    pub total_count: usize,
    pub last_error: Option<String>,
}

/// Everything mutated between awaits. The lock is only ever held for short
/// synchronous sections; network calls and timers run outside it and
/// re-validate the generation afterwards.
pub(crate) struct EngineState {
    pub generation: u64,
    pub date: Option<NaiveDate>,
    pub roster: Vec<Employee>,
    pub day_name: String,
    pub has_excel_flag: bool,
    pub cache: RosterCache,
    pub in_flight: InFlightRegistry,
    pub store: AttendanceStore,
    pub display: DisplayWindow,
    pub load: LoadProgress,
}

impl EngineState {
    fn new(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            generation: 0,
            date: None,
            roster: Vec::new(),
            day_name: String::new(),
            has_excel_flag: false,
            cache: RosterCache::new(config.roster_ttl, clock),
            in_flight: InFlightRegistry::default(),
            store: AttendanceStore::new(),
            display: DisplayWindow::new(config.display_window, config.display_increment),
            load: LoadProgress::default(),
        }
    }
}

/// Read-only snapshot of the load state for the UI.
#[derive(Debug, Clone)]
pub struct LoadStatus {
    pub complete: bool,
    pub has_more: bool,
    pub total_count: usize,
    pub loaded: usize,
    pub revealed: usize,
    pub day_name: String,
    pub has_excel_flag: bool,
    pub last_error: Option<String>,
}

/// The attendance reconciliation and progressive synchronization engine.
/// Owns the per-date working set, the roster cache, the in-flight registry
/// and the display window; the UI host drives it through `open_date`, the
/// edit methods and `save`.
pub struct AttendanceEngine<A: AttendanceApi> {
    pub(crate) api: Arc<A>,
    pub(crate) config: EngineConfig,
    pub(crate) events: EventBus,
    pub(crate) holidays: Cache<NaiveDate, HolidayResponse>,
    pub(crate) state: Mutex<EngineState>,
    // Date-scoped timer/fetch tasks, aborted on date change and drop.
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
}

pub(crate) fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl AttendanceEngine<crate::api::HttpAttendanceApi> {
    /// Engine wired to the real backend from configuration.
    pub fn from_config(config: EngineConfig) -> Arc<Self> {
        let api = crate::api::HttpAttendanceApi::new(config.api_base_url.clone());
        Self::new(api, config)
    }
}

impl<A: AttendanceApi + 'static> AttendanceEngine<A> {
    pub fn new(api: A, config: EngineConfig) -> Arc<Self> {
        Self::with_clock(api, config, Arc::new(SystemClock))
    }

    pub fn with_clock(api: A, config: EngineConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let engine = Arc::new(Self {
            api: Arc::new(api),
            events: EventBus::new(config.event_capacity),
            holidays: build_holiday_cache(config.holiday_ttl),
            state: Mutex::new(EngineState::new(&config, clock)),
            config,
            tasks: Mutex::new(Vec::new()),
        });
        engine.spawn_event_listener();
        engine
    }

    /// Bus shared with collaborator features (uploads, employee CRUD, holiday
    /// management).
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Entries currently revealed to the UI, in roster order.
    pub fn revealed_entries(&self) -> Vec<AttendanceEntry> {
        let st = self.state.lock().unwrap();
        let n = st.display.revealed(st.store.len());
        st.store.iter_ordered().take(n).cloned().collect()
    }

    pub fn entry(&self, employee_id: i64) -> Option<AttendanceEntry> {
        let st = self.state.lock().unwrap();
        st.store.get(employee_id).cloned()
    }

    pub fn load_status(&self) -> LoadStatus {
        let st = self.state.lock().unwrap();
        LoadStatus {
            complete: st.load.complete,
            has_more: st.load.has_more,
            total_count: st.load.total_count,
            loaded: st.store.len(),
            revealed: st.display.revealed(st.store.len()),
            day_name: st.day_name.clone(),
            has_excel_flag: st.has_excel_flag,
            last_error: st.load.last_error.clone(),
        }
    }

    /// Status button press for one employee.
    pub fn toggle_status(&self, employee_id: i64, pressed: AttendanceStatus) -> EngineResult<()> {
        let mut st = self.state.lock().unwrap();
        if st.store.toggle(employee_id, pressed) {
            Ok(())
        } else {
            Err(EngineError::UnknownEmployee(employee_id))
        }
    }

    pub fn set_clock_in(&self, employee_id: i64, t: chrono::NaiveTime) -> EngineResult<()> {
        let mut st = self.state.lock().unwrap();
        if st.store.set_clock_in(employee_id, t) {
            Ok(())
        } else {
            Err(EngineError::UnknownEmployee(employee_id))
        }
    }

    pub fn set_clock_out(&self, employee_id: i64, t: chrono::NaiveTime) -> EngineResult<()> {
        let mut st = self.state.lock().unwrap();
        if st.store.set_clock_out(employee_id, t) {
            Ok(())
        } else {
            Err(EngineError::UnknownEmployee(employee_id))
        }
    }

    /// Drop the roster cache and any in-flight bookkeeping. Idempotent.
    pub fn invalidate_all(&self) {
        let mut st = self.state.lock().unwrap();
        st.cache.invalidate_all();
        st.in_flight.clear();
    }

    pub(crate) fn handle_event(&self, event: DomainEvent) {
        tracing::debug!(?event, "handling domain event");
        match event {
            DomainEvent::DataUploaded
            | DomainEvent::EmployeeAdded
            | DomainEvent::AttendanceUpdated => self.invalidate_all(),
            DomainEvent::HolidayUpdated => {
                self.invalidate_all();
                self.holidays.invalidate_all();
            }
            DomainEvent::RefreshEmployeeData => {}
        }
    }

    fn spawn_event_listener(self: &Arc<Self>) {
        let mut rx = self.events.subscribe();
        let weak = Arc::downgrade(self);
        // Exits when the engine is dropped: the sender goes away and recv
        // returns Closed. Not tracked in `tasks`, which are date-scoped.
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(engine) = weak.upgrade() else { break };
                        engine.handle_event(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged, invalidating caches");
                        let Some(engine) = weak.upgrade() else { break };
                        engine.invalidate_all();
                        engine.holidays.invalidate_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Abort outstanding date-scoped tasks (display pacing, scheduled
    /// background fetches).
    pub(crate) fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl<A: AttendanceApi> Drop for AttendanceEngine<A> {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::MockApi;
    use crate::models::RosterResponse;
    use std::sync::atomic::Ordering;

    fn employee(id: i64) -> Employee {
        Employee {
            employee_id: id,
            first_name: format!("Emp{id}"),
            last_name: None,
            department: None,
            shift_start: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            shift_end: chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            has_off_day: false,
            default_status: None,
            current_attendance: None,
        }
    }

    fn full_roster(n: i64) -> RosterResponse {
        RosterResponse {
            eligible_employees: (1..=n).map(employee).collect(),
            total_count: n as usize,
            day_name: "Monday".into(),
            has_excel_attendance: false,
            performance: None,
            progressive_loading: None,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn engine_with(api: MockApi) -> Arc<AttendanceEngine<MockApi>> {
        AttendanceEngine::new(api, EngineConfig::default())
    }

    #[tokio::test]
    async fn upload_event_invalidates_the_roster_cache() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(full_roster(10));
        let engine = engine_with(api);

        engine.select_date(date()).await.unwrap();
        assert_eq!(engine.api.initial_calls.load(Ordering::SeqCst), 1);

        engine.handle_event(DomainEvent::DataUploaded);

        // Reselecting the same date must refetch.
        engine.select_date(date()).await.unwrap();
        assert_eq!(engine.api.initial_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn published_events_reach_the_listener_task() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(full_roster(10));
        let engine = engine_with(api);

        engine.select_date(date()).await.unwrap();
        engine.events().publish(DomainEvent::EmployeeAdded);

        // Give the listener task a turn on the runtime.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        engine.select_date(date()).await.unwrap();
        assert_eq!(engine.api.initial_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn holiday_updated_clears_the_holiday_cache() {
        let api = MockApi::new();
        let engine = engine_with(api);

        engine.holiday_status(date()).await.unwrap();
        engine.holiday_status(date()).await.unwrap();
        assert_eq!(engine.api.holiday_calls.load(Ordering::SeqCst), 1);

        engine.handle_event(DomainEvent::HolidayUpdated);

        engine.holiday_status(date()).await.unwrap();
        assert_eq!(engine.api.holiday_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn revealed_entries_respect_the_display_window() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(full_roster(45));
        let engine = engine_with(api);

        engine.select_date(date()).await.unwrap();
        let revealed = engine.revealed_entries();
        assert_eq!(revealed.len(), 30);
        assert_eq!(revealed[0].employee_id, 1);
        assert_eq!(engine.load_status().loaded, 45);
    }

    #[tokio::test]
    async fn edits_against_unknown_employees_are_rejected() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(full_roster(3));
        let engine = engine_with(api);
        engine.select_date(date()).await.unwrap();

        let err = engine
            .toggle_status(99, AttendanceStatus::Present)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownEmployee(99)));
    }

    #[tokio::test]
    async fn date_change_wipes_the_working_set_wholesale() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(full_roster(5));
        let engine = engine_with(api);

        engine.select_date(date()).await.unwrap();
        engine.toggle_status(1, AttendanceStatus::Present).unwrap();

        let other = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        engine.select_date(other).await.unwrap();
        assert_eq!(
            engine.entry(1).unwrap().status,
            AttendanceStatus::Unmarked
        );
    }
}
