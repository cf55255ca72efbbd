// The in-memory fire ledger: composite task key -> last-fired marker.
// Consulted and mutated only by the scheduler, on its own task. State does
// not survive a restart; after one, time-of-day slots re-arm for the current
// window and intervals re-arm immediately, which is the accepted
// at-least-once-within-tolerance behavior.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;

/// The marker recorded for a fired task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireMarker {
    /// The calendar date of the last fire (time-of-day slots).
    Day(NaiveDate),
    /// The timestamp of the last successful dispatch (interval mode).
    At(NaiveDateTime),
}

/// In-memory map from composite task key to last-fired marker.
#[derive(Debug, Default)]
pub struct RunLedger {
    entries: HashMap<String, FireMarker>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for a plain daily slot: at most one fire per task per scheduled
    /// time per calendar date.
    pub fn daily_key(task: &str, time_label: &str, date: NaiveDate) -> String {
        format!("{}|{}|{}", task, time_label, date.format("%Y-%m-%d"))
    }

    /// Key for an N-day-throttled slot: the date lives in the marker and is
    /// compared by day difference, not key equality.
    pub fn cycle_key(task: &str, time_label: &str) -> String {
        format!("{}|{}", task, time_label)
    }

    /// Key for an interval-mode task.
    pub fn interval_key(task: &str) -> String {
        format!("{}|interval", task)
    }

    pub fn get(&self, key: &str) -> Option<FireMarker> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Record a day marker for `key`.
    pub fn mark_day(&mut self, key: String, date: NaiveDate) {
        self.entries.insert(key, FireMarker::Day(date));
    }

    /// Record a timestamp marker for `key`.
    pub fn mark_at(&mut self, key: String, at: NaiveDateTime) {
        self.entries.insert(key, FireMarker::At(at));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn key_shapes() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            RunLedger::daily_key("valida_bkp.exe", "12:00", date),
            "valida_bkp.exe|12:00|2024-03-05"
        );
        assert_eq!(
            RunLedger::cycle_key("valida_bkp.exe", "09:00"),
            "valida_bkp.exe|09:00"
        );
        assert_eq!(RunLedger::interval_key("sync.exe"), "sync.exe|interval");
    }

    #[test]
    fn markers_roundtrip() {
        let mut ledger = RunLedger::new();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let at = date.and_hms_opt(10, 30, 0).unwrap();

        ledger.mark_day("a|12:00|2024-03-05".into(), date);
        ledger.mark_at(RunLedger::interval_key("b"), at);

        assert_eq!(ledger.get("a|12:00|2024-03-05"), Some(FireMarker::Day(date)));
        assert_eq!(ledger.get("b|interval"), Some(FireMarker::At(at)));
        assert!(!ledger.contains("c|interval"));
        assert_eq!(ledger.len(), 2);
    }
}
