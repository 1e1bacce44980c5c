use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;

use crate::clock::Clock;
use crate::models::{Employee, HolidayResponse};

/// Cached roster for one date, replaced wholesale on refresh.
#[derive(Debug, Clone)]
pub struct RosterCacheEntry {
    pub date_key: String,
    pub employees: Vec<Employee>,
    pub day_name: String,
    pub has_excel_flag: bool,
    pub fetched_at: DateTime<Utc>,
}

/// Time-boxed roster cache keyed by date. Staleness is checked against an
/// injected clock; a stale hit is evicted and reported as a miss.
pub struct RosterCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: HashMap<String, RosterCacheEntry>,
}

impl RosterCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, date_key: &str) -> Option<&RosterCacheEntry> {
        let fresh = match self.entries.get(date_key) {
            Some(entry) => {
                let age = self.clock.now() - entry.fetched_at;
                age.to_std().map(|age| age < self.ttl).unwrap_or(true)
            }
            None => return None,
        };
        if !fresh {
            tracing::debug!(date_key, "evicting stale roster cache entry");
            self.entries.remove(date_key);
            return None;
        }
        self.entries.get(date_key)
    }

    pub fn put(
        &mut self,
        date_key: String,
        employees: Vec<Employee>,
        day_name: String,
        has_excel_flag: bool,
    ) {
        let entry = RosterCacheEntry {
            date_key: date_key.clone(),
            employees,
            day_name,
            has_excel_flag,
            fetched_at: self.clock.now(),
        };
        self.entries.insert(date_key, entry);
    }

    /// Safe to call at any time, including when already empty.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Set of date keys with a fetch currently outstanding. Acts as the
/// mutual-exclusion gate: one fetch per key.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    keys: HashSet<String>,
}

impl InFlightRegistry {
    /// Returns false when a fetch for this key is already running.
    pub fn begin(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    pub fn end(&mut self, key: &str) {
        self.keys.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Holiday lookups change rarely; cache them for an hour.
pub fn build_holiday_cache(ttl: Duration) -> Cache<chrono::NaiveDate, HolidayResponse> {
    Cache::builder().time_to_live(ttl).build()
}
