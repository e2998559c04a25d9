//! Shared state for the latest observation and upload history

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::report::{ReportRecord, Snapshot};

/// Shared state written by the reporter and read by the status server
#[derive(Debug)]
pub struct StationState {
    pub latest: Option<Snapshot>,
    pub history: VecDeque<ReportRecord>,
    pub history_max_size: usize,
    pub started_at: Instant,
}

impl StationState {
    pub fn new(history_max_size: usize) -> Self {
        Self {
            latest: None,
            history: VecDeque::with_capacity(history_max_size),
            history_max_size,
            started_at: Instant::now(),
        }
    }

    pub fn set_latest(&mut self, snapshot: Snapshot) {
        self.latest = Some(snapshot);
    }

    /// Add an upload outcome, dropping the oldest beyond the size limit
    pub fn add_record(&mut self, record: ReportRecord) {
        if self.history_max_size == 0 {
            return;
        }
        if self.history.len() >= self.history_max_size {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<StationState>>;

pub fn new_state_handle(history_max_size: usize) -> StateHandle {
    Arc::new(RwLock::new(StationState::new(history_max_size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(sink: &str) -> ReportRecord {
        ReportRecord {
            sink: sink.to_string(),
            success: true,
            error: None,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut state = StationState::new(2);
        state.add_record(record("a"));
        state.add_record(record("b"));
        state.add_record(record("c"));

        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0].sink, "b");
        assert_eq!(state.history[1].sink, "c");
    }

    #[test]
    fn zero_history_keeps_nothing() {
        let mut state = StationState::new(0);
        state.add_record(record("a"));
        assert!(state.history.is_empty());
    }

    #[tokio::test]
    async fn handle_shares_latest() {
        let handle = new_state_handle(10);
        let snapshot = Snapshot::empty(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        handle.write().await.set_latest(snapshot.clone());

        assert_eq!(handle.read().await.latest, Some(snapshot));
    }
}
