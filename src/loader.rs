//! Progressive load orchestration: staged fetch, cache consultation, dedupe,
//! append-only background merge.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use crate::api::AttendanceApi;
use crate::display::PacingStep;
use crate::engine::{date_key, AttendanceEngine, EngineState};
use crate::error::EngineResult;

/// Scheduled background fetch of the roster remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundPlan {
    pub delay: Duration,
    pub generation: u64,
}

/// How a date selection was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Fresh cache hit; hydrated without a network call.
    FromCache { generation: u64 },
    /// Initial batch fetched and hydrated. `background` is present when the
    /// server asked for an auto-triggered remainder fetch.
    Loaded {
        generation: u64,
        background: Option<BackgroundPlan>,
    },
    /// A fetch for this date key is already running.
    AlreadyInFlight,
    /// Another date was selected while the fetch was outstanding; the result
    /// was discarded.
    Superseded,
}

/// Holds the registered in-flight key for the duration of a fetch. Dropping
/// the guard releases the key, so a fetch future abandoned at its network
/// await (task abort, caller timeout) cannot leave the date permanently
/// gated.
struct InFlightGuard<'a, A: AttendanceApi> {
    engine: &'a AttendanceEngine<A>,
    key: Option<String>,
}

impl<'a, A: AttendanceApi> InFlightGuard<'a, A> {
    fn new(engine: &'a AttendanceEngine<A>, key: String) -> Self {
        Self {
            engine,
            key: Some(key),
        }
    }

    /// Release under an already-held state lock. Must be used instead of
    /// letting the guard drop while the lock is held.
    fn release(&mut self, st: &mut EngineState) {
        if let Some(key) = self.key.take() {
            st.in_flight.end(&key);
        }
    }
}

impl<A: AttendanceApi> Drop for InFlightGuard<'_, A> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.engine.state.lock().unwrap().in_flight.end(&key);
        }
    }
}

impl<A: AttendanceApi + 'static> AttendanceEngine<A> {
    /// Full production path for a date selection: cancel the previous date's
    /// timers, load, then schedule the background fetch and the display
    /// pacing loop as needed.
    pub async fn open_date(self: &Arc<Self>, date: NaiveDate) -> EngineResult<LoadOutcome> {
        self.abort_tasks();
        let outcome = self.select_date(date).await?;
        match outcome {
            LoadOutcome::FromCache { generation } => {
                self.spawn_pacing(generation);
            }
            LoadOutcome::Loaded {
                generation,
                background,
            } => {
                if let Some(plan) = background {
                    self.spawn_background(plan);
                }
                self.spawn_pacing(generation);
            }
            LoadOutcome::AlreadyInFlight | LoadOutcome::Superseded => {}
        }
        Ok(outcome)
    }

    /// Select a date: wipe the working set, consult the cache, dedupe against
    /// in-flight fetches, then fetch and hydrate the initial batch.
    pub async fn select_date(self: &Arc<Self>, date: NaiveDate) -> EngineResult<LoadOutcome> {
        let key = date_key(date);
        let generation = {
            let mut st = self.state.lock().unwrap();
            // Bumping the generation is the cancellation signal: any result
            // still in flight for the previous selection gets discarded.
            st.generation += 1;
            let generation = st.generation;
            st.date = Some(date);
            st.store.clear();
            st.display.reset();
            st.roster.clear();
            st.day_name.clear();
            st.has_excel_flag = false;
            st.load = Default::default();

            let hit = st
                .cache
                .get(&key)
                .map(|e| (e.employees.clone(), e.day_name.clone(), e.has_excel_flag));
            if let Some((employees, day_name, has_excel_flag)) = hit {
                tracing::debug!(date_key = %key, employees = employees.len(), "roster cache hit");
                st.store.hydrate(&employees);
                st.roster = employees;
                st.day_name = day_name;
                st.has_excel_flag = has_excel_flag;
                st.load.total_count = st.roster.len();
                st.load.complete = true;
                return Ok(LoadOutcome::FromCache { generation });
            }

            if !st.in_flight.begin(&key) {
                tracing::debug!(date_key = %key, "fetch already in flight, skipping");
                return Ok(LoadOutcome::AlreadyInFlight);
            }
            generation
        };
        let mut guard = InFlightGuard::new(self, key.clone());

        let result = self.api.fetch_roster_initial(date).await;

        let mut st = self.state.lock().unwrap();
        guard.release(&mut st);
        if st.generation != generation {
            tracing::debug!(date_key = %key, "initial fetch superseded, discarding result");
            return Ok(LoadOutcome::Superseded);
        }

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                st.load.complete = true;
                st.load.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        st.store.hydrate(&response.eligible_employees);
        st.roster = response.eligible_employees;
        st.day_name = response.day_name;
        st.has_excel_flag = response.has_excel_attendance;
        st.load.total_count = response.total_count;

        let progressive = response.progressive_loading;
        let has_more = progressive.as_ref().map(|p| p.has_more).unwrap_or(false);
        st.load.has_more = has_more;
        if !has_more {
            st.load.complete = true;
            let roster = st.roster.clone();
            let day_name = st.day_name.clone();
            let excel = st.has_excel_flag;
            st.cache.put(key.clone(), roster, day_name, excel);
        }

        let background = progressive
            .filter(|p| p.has_more && p.auto_trigger_remaining)
            .map(|p| BackgroundPlan {
                delay: Duration::from_millis(p.recommended_delay_ms),
                generation,
            });

        tracing::debug!(
            date_key = %key,
            loaded = st.store.len(),
            total = st.load.total_count,
            has_more,
            "initial batch hydrated"
        );
        Ok(LoadOutcome::Loaded {
            generation,
            background,
        })
    }

    /// Fetch the roster remainder and merge it append-only. Existing store
    /// entries are never overwritten; only newly-introduced employees get an
    /// entry. Failures are logged and the load is marked complete anyway so
    /// the initial batch stays usable.
    pub async fn fetch_remaining(&self, generation: u64) -> EngineResult<()> {
        let (date, key) = {
            let mut st = self.state.lock().unwrap();
            if st.generation != generation {
                return Ok(());
            }
            let Some(date) = st.date else {
                return Ok(());
            };
            let key = date_key(date);
            if !st.in_flight.begin(&key) {
                return Ok(());
            }
            (date, key)
        };
        let mut guard = InFlightGuard::new(self, key.clone());

        let result = self.api.fetch_roster_remaining(date).await;

        let mut st = self.state.lock().unwrap();
        guard.release(&mut st);
        if st.generation != generation {
            tracing::debug!(date_key = %key, "remainder fetch superseded, discarding result");
            return Ok(());
        }

        match result {
            Ok(response) => {
                let added = st.store.admit_new(&response.eligible_employees);
                let known: HashSet<i64> =
                    st.roster.iter().map(|e| e.employee_id).collect();
                for emp in response.eligible_employees {
                    if !known.contains(&emp.employee_id) {
                        st.roster.push(emp);
                    }
                }
                st.load.total_count = response.total_count.max(st.roster.len());
                st.load.has_more = false;
                st.load.complete = true;
                let roster = st.roster.clone();
                let day_name = st.day_name.clone();
                let excel = st.has_excel_flag;
                st.cache.put(key.clone(), roster, day_name, excel);
                tracing::debug!(date_key = %key, added, total = st.store.len(), "background merge complete");
            }
            Err(e) => {
                // Initial batch remains the source of truth; never surfaced,
                // never retried automatically.
                tracing::warn!(date_key = %key, error = %e, "background roster fetch failed");
                st.load.last_error = Some(e.to_string());
                st.load.has_more = false;
                st.load.complete = true;
            }
        }
        Ok(())
    }

    fn spawn_background(self: &Arc<Self>, plan: BackgroundPlan) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(plan.delay).await;
            let Some(engine) = weak.upgrade() else { return };
            if let Err(e) = engine.fetch_remaining(plan.generation).await {
                tracing::warn!(error = %e, "scheduled background fetch failed");
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    fn spawn_pacing(self: &Arc<Self>, generation: u64) {
        let weak = Arc::downgrade(self);
        let delay = self.config.reveal_delay;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                let Some(engine) = weak.upgrade() else { break };
                let step = {
                    let mut st = engine.state.lock().unwrap();
                    if st.generation != generation {
                        break;
                    }
                    let loaded = st.store.len();
                    let step =
                        st.display
                            .next_step(loaded, st.load.complete, st.load.has_more);
                    if step == PacingStep::Reveal {
                        st.display.advance(loaded);
                    }
                    step
                };
                match step {
                    PacingStep::Reveal | PacingStep::Wait => {}
                    PacingStep::TriggerBackground => {
                        if let Err(e) = engine.fetch_remaining(generation).await {
                            tracing::warn!(error = %e, "display-triggered background fetch failed");
                        }
                    }
                    PacingStep::Done => break,
                }
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::MockApi;
    use crate::config::EngineConfig;
    use crate::models::{
        AttendanceStatus, Employee, ProgressiveLoading, RemainderResponse, RosterResponse,
    };
    use chrono::NaiveTime;
    use std::sync::atomic::Ordering;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn employee(id: i64) -> Employee {
        Employee {
            employee_id: id,
            first_name: format!("Emp{id}"),
            last_name: None,
            department: Some("Production".into()),
            shift_start: t(9, 0),
            shift_end: t(18, 0),
            has_off_day: false,
            default_status: None,
            current_attendance: None,
        }
    }

    fn batch(range: std::ops::RangeInclusive<i64>) -> Vec<Employee> {
        range.map(employee).collect()
    }

    fn roster(employees: Vec<Employee>, total: usize, has_more: bool) -> RosterResponse {
        RosterResponse {
            eligible_employees: employees,
            total_count: total,
            day_name: "Monday".into(),
            has_excel_attendance: false,
            performance: None,
            progressive_loading: has_more.then(|| ProgressiveLoading {
                has_more: true,
                auto_trigger_remaining: true,
                remaining_employees: 30,
                recommended_delay_ms: 1000,
            }),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn engine_with(api: MockApi) -> Arc<AttendanceEngine<MockApi>> {
        AttendanceEngine::new(api, EngineConfig::default())
    }

    #[tokio::test]
    async fn initial_batch_hydrates_and_reports_background_plan() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(roster(batch(1..=50), 80, true));
        let engine = engine_with(api);

        let outcome = engine.select_date(date()).await.unwrap();
        let LoadOutcome::Loaded {
            background: Some(plan),
            ..
        } = outcome
        else {
            panic!("expected loaded outcome with background plan, got {outcome:?}");
        };
        assert_eq!(plan.delay, Duration::from_millis(1000));

        let status = engine.load_status();
        assert_eq!(status.loaded, 50);
        assert_eq!(status.total_count, 80);
        assert!(status.has_more);
        assert!(!status.complete);
        assert_eq!(status.revealed, 30);
    }

    #[tokio::test]
    async fn user_edit_survives_background_merge() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(roster(batch(1..=50), 80, true));
        *api.remainder.lock().unwrap() = Some(Ok(RemainderResponse {
            eligible_employees: batch(51..=80),
            total_count: 80,
            performance: None,
        }));
        let engine = engine_with(api);

        let LoadOutcome::Loaded { generation, .. } = engine.select_date(date()).await.unwrap()
        else {
            panic!("expected loaded outcome");
        };

        // User marks employee 7 absent before the remainder arrives.
        engine
            .toggle_status(7, AttendanceStatus::Absent)
            .unwrap();

        engine.fetch_remaining(generation).await.unwrap();

        let status = engine.load_status();
        assert!(status.complete);
        assert_eq!(status.loaded, 80);
        assert_eq!(
            engine.entry(7).unwrap().status,
            AttendanceStatus::Absent
        );
        assert_eq!(
            engine.entry(80).unwrap().status,
            AttendanceStatus::Unmarked
        );
    }

    #[tokio::test]
    async fn fresh_cache_hit_skips_the_network() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(roster(batch(1..=10), 10, false));
        let engine = engine_with(api);

        let first = engine.select_date(date()).await.unwrap();
        assert!(matches!(first, LoadOutcome::Loaded { .. }));
        assert_eq!(engine.api.initial_calls.load(Ordering::SeqCst), 1);

        let second = engine.select_date(date()).await.unwrap();
        assert!(matches!(second, LoadOutcome::FromCache { .. }));
        assert_eq!(engine.api.initial_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.load_status().loaded, 10);
        assert!(engine.load_status().complete);
    }

    #[tokio::test]
    async fn in_flight_key_short_circuits_duplicate_fetch() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(roster(batch(1..=10), 10, false));
        let engine = engine_with(api);

        engine
            .state
            .lock()
            .unwrap()
            .in_flight
            .begin("2025-06-02");

        let outcome = engine.select_date(date()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::AlreadyInFlight);
        assert_eq!(engine.api.initial_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_generation_remainder_is_discarded() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(roster(batch(1..=50), 80, true));
        *api.remainder.lock().unwrap() = Some(Ok(RemainderResponse {
            eligible_employees: batch(51..=80),
            total_count: 80,
            performance: None,
        }));
        let engine = engine_with(api);

        let LoadOutcome::Loaded {
            generation: stale, ..
        } = engine.select_date(date()).await.unwrap()
        else {
            panic!("expected loaded outcome");
        };

        // A new date selection supersedes the first one.
        let other = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        engine.select_date(other).await.unwrap();

        engine.fetch_remaining(stale).await.unwrap();
        assert_eq!(engine.api.remaining_calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.load_status().loaded, 50);
    }

    #[tokio::test]
    async fn dropped_remainder_fetch_releases_the_in_flight_key() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(roster(batch(1..=50), 80, true));
        api.stall_remainder.store(true, Ordering::SeqCst);
        let engine = engine_with(api);

        let LoadOutcome::Loaded { generation, .. } = engine.select_date(date()).await.unwrap()
        else {
            panic!("expected loaded outcome");
        };

        // Abandon the remainder fetch while it is parked on the network
        // await, as a task abort on date change does.
        let fetch = engine.fetch_remaining(generation);
        assert!(tokio::time::timeout(Duration::from_millis(20), fetch)
            .await
            .is_err());
        assert!(!engine.state.lock().unwrap().in_flight.contains("2025-06-02"));

        // The date is not stuck behind a leaked key: reselecting refetches.
        let outcome = engine.select_date(date()).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
        assert_eq!(engine.api.initial_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_initial_fetch_releases_the_in_flight_key() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(roster(batch(1..=10), 10, false));
        api.stall_initial.store(true, Ordering::SeqCst);
        let engine = engine_with(api);

        let select = engine.select_date(date());
        assert!(tokio::time::timeout(Duration::from_millis(20), select)
            .await
            .is_err());
        assert!(!engine.state.lock().unwrap().in_flight.contains("2025-06-02"));

        engine.api.stall_initial.store(false, Ordering::SeqCst);
        let outcome = engine.select_date(date()).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
    }

    #[tokio::test]
    async fn failed_background_fetch_keeps_initial_batch_and_completes() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(roster(batch(1..=50), 80, true));
        *api.remainder.lock().unwrap() = Some(Err("query timeout".into()));
        let engine = engine_with(api);

        let LoadOutcome::Loaded { generation, .. } = engine.select_date(date()).await.unwrap()
        else {
            panic!("expected loaded outcome");
        };

        engine.fetch_remaining(generation).await.unwrap();

        let status = engine.load_status();
        assert!(status.complete);
        assert_eq!(status.loaded, 50);
        assert!(status.last_error.unwrap().contains("query timeout"));
    }

    #[tokio::test]
    async fn failed_initial_fetch_leaves_roster_empty() {
        let api = MockApi::new();
        let engine = engine_with(api);

        let err = engine.select_date(date()).await.unwrap_err();
        assert!(matches!(err, crate::EngineError::Api { .. }));
        let status = engine.load_status();
        assert_eq!(status.loaded, 0);
        assert!(status.complete);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn completed_merge_is_cached_for_the_next_selection() {
        let api = MockApi::new();
        *api.initial.lock().unwrap() = Some(roster(batch(1..=50), 80, true));
        *api.remainder.lock().unwrap() = Some(Ok(RemainderResponse {
            eligible_employees: batch(51..=80),
            total_count: 80,
            performance: None,
        }));
        let engine = engine_with(api);

        let LoadOutcome::Loaded { generation, .. } = engine.select_date(date()).await.unwrap()
        else {
            panic!("expected loaded outcome");
        };
        engine.fetch_remaining(generation).await.unwrap();

        let outcome = engine.select_date(date()).await.unwrap();
        assert!(matches!(outcome, LoadOutcome::FromCache { .. }));
        assert_eq!(engine.load_status().loaded, 80);
        assert_eq!(engine.api.initial_calls.load(Ordering::SeqCst), 1);
    }
}
