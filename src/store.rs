use std::collections::HashMap;

use chrono::NaiveTime;

use crate::models::{AttendanceEntry, AttendanceStatus, Employee};

/// Working set of attendance entries for the selected date. Keyed by employee
/// id, with insertion order preserved for display. Owns the status transition
/// rules; never touches the network.
#[derive(Debug, Default)]
pub struct AttendanceStore {
    order: Vec<i64>,
    entries: HashMap<i64, AttendanceEntry>,
}

impl AttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the status derivation priority for every roster record:
    /// 1. backend-saved status wins outright (detail included),
    /// 2. otherwise an existing local entry is preserved unchanged,
    /// 3. otherwise the roster's default_status,
    /// 4. otherwise off for an off day,
    /// 5. otherwise unmarked.
    pub fn hydrate(&mut self, employees: &[Employee]) {
        for emp in employees {
            self.admit(emp);
        }
    }

    /// Merge path: derive entries only for ids not yet known. Existing
    /// entries are never altered, whatever the incoming record says. This is
    /// what protects user edits made while a background fetch was outstanding.
    pub fn admit_new(&mut self, employees: &[Employee]) -> usize {
        let mut added = 0;
        for emp in employees {
            if self.entries.contains_key(&emp.employee_id) {
                continue;
            }
            self.insert(Self::derive(emp));
            added += 1;
        }
        added
    }

    fn admit(&mut self, emp: &Employee) {
        let saved = emp
            .current_attendance
            .as_ref()
            .and_then(|a| a.status.as_deref().and_then(AttendanceStatus::parse_saved));

        if saved.is_none() && self.entries.contains_key(&emp.employee_id) {
            // Local edit with no backend save: keep it as-is.
            return;
        }
        self.insert(Self::derive(emp));
    }

    fn derive(emp: &Employee) -> AttendanceEntry {
        let mut entry = AttendanceEntry::base(emp);

        let saved = emp
            .current_attendance
            .as_ref()
            .and_then(|a| a.status.as_deref().and_then(AttendanceStatus::parse_saved));
        if let Some(status) = saved {
            entry.status = status;
            if let Some(att) = &emp.current_attendance {
                entry.apply_saved_detail(att);
            }
            return entry;
        }

        if let Some(status) = emp
            .default_status
            .as_deref()
            .and_then(AttendanceStatus::parse_saved)
        {
            entry.status = status;
        } else if emp.has_off_day {
            entry.status = AttendanceStatus::Off;
        }
        entry
    }

    fn insert(&mut self, entry: AttendanceEntry) {
        if !self.entries.contains_key(&entry.employee_id) {
            self.order.push(entry.employee_id);
        }
        self.entries.insert(entry.employee_id, entry);
    }

    /// Status button press. Pressing the active status returns the entry to
    /// unmarked; off-day entries resolve absent to off (the "back to off"
    /// control) and return to off when present is toggled back.
    pub fn toggle(&mut self, employee_id: i64, pressed: AttendanceStatus) -> bool {
        let Some(entry) = self.entries.get_mut(&employee_id) else {
            return false;
        };

        let target = if entry.has_off_day {
            match pressed {
                AttendanceStatus::Absent | AttendanceStatus::Off => AttendanceStatus::Off,
                AttendanceStatus::Present if entry.status == AttendanceStatus::Present => {
                    AttendanceStatus::Off
                }
                other => other,
            }
        } else if pressed == entry.status {
            AttendanceStatus::Unmarked
        } else {
            pressed
        };

        tracing::debug!(
            employee_id,
            from = entry.status.as_str(),
            to = target.as_str(),
            "status transition"
        );
        entry.transition(target);
        true
    }

    /// Clock-in edit; no-op unless the entry is present.
    pub fn set_clock_in(&mut self, employee_id: i64, t: NaiveTime) -> bool {
        match self.entries.get_mut(&employee_id) {
            Some(entry) => {
                entry.set_clock_in(t);
                true
            }
            None => false,
        }
    }

    /// Clock-out edit; no-op unless the entry is present.
    pub fn set_clock_out(&mut self, employee_id: i64, t: NaiveTime) -> bool {
        match self.entries.get_mut(&employee_id) {
            Some(entry) => {
                entry.set_clock_out(t);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, employee_id: i64) -> Option<&AttendanceEntry> {
        self.entries.get(&employee_id)
    }

    /// Entries in roster insertion order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &AttendanceEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Display names of entries still unmarked, in display order.
    pub fn unmarked_names(&self) -> Vec<String> {
        self.iter_ordered()
            .filter(|e| e.status == AttendanceStatus::Unmarked)
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wipe everything. Entries are never partially reset.
    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}
