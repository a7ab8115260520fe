//! Audit store — bounded in-memory window of terminal decisions with a
//! broadcast fan-out for the SSE stream and a CSV export.
//!
//! Records are appended in the order decisions become terminal, not in
//! request-arrival order. The window is mirrored into the persisted
//! state by a periodic flush (write-behind, so the hot path never waits
//! on disk).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use sg_domain::model::{AuditRecord, MAX_POLICY_EVALUATIONS};

pub struct AuditStore {
    records: Mutex<VecDeque<AuditRecord>>,
    event_tx: broadcast::Sender<AuditRecord>,
    dirty: AtomicBool,
}

impl Default for AuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditStore {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            records: Mutex::new(VecDeque::new()),
            event_tx,
            dirty: AtomicBool::new(false),
        }
    }

    /// Preload the window from the persisted state at boot.
    pub fn preload(&self, records: &[AuditRecord]) {
        let mut window = self.records.lock();
        window.clear();
        window.extend(records.iter().cloned());
        while window.len() > MAX_POLICY_EVALUATIONS {
            window.pop_front();
        }
    }

    /// Append a terminal record, evicting past the cap, and fan out to
    /// stream subscribers.
    pub fn append(&self, record: AuditRecord) {
        {
            let mut window = self.records.lock();
            window.push_back(record.clone());
            while window.len() > MAX_POLICY_EVALUATIONS {
                window.pop_front();
            }
        }
        self.dirty.store(true, Ordering::Release);
        let _ = self.event_tx.send(record);
    }

    /// Most recent records, newest last.
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let window = self.records.lock();
        let skip = window.len().saturating_sub(limit);
        window.iter().skip(skip).cloned().collect()
    }

    pub fn find(&self, request_id: &str) -> Option<AuditRecord> {
        self.records
            .lock()
            .iter()
            .rev()
            .find(|r| r.request_id == request_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.event_tx.subscribe()
    }

    /// Whole window as CSV (header + one row per record).
    pub fn export_csv(&self) -> String {
        let window = self.records.lock();
        let mut out = String::from(AuditRecord::csv_header());
        out.push('\n');
        for record in window.iter() {
            out.push_str(&record.csv_row());
            out.push('\n');
        }
        out
    }

    /// Snapshot the window and clear the dirty flag; `None` when nothing
    /// changed since the last flush.
    pub fn take_for_flush(&self) -> Option<Vec<AuditRecord>> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(self.records.lock().iter().cloned().collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sg_domain::{CanonicalAction, Decision};

    fn record(request_id: &str) -> AuditRecord {
        let mut action = CanonicalAction::tool_call("read_file", serde_json::Map::new());
        action.request_id = request_id.into();
        AuditRecord::decided(&action, &Decision::allow("ok"))
    }

    #[test]
    fn append_and_find() {
        let store = AuditStore::new();
        store.append(record("r-1"));
        store.append(record("r-2"));
        assert_eq!(store.len(), 2);
        assert!(store.find("r-1").is_some());
        assert!(store.find("r-3").is_none());
    }

    #[test]
    fn window_is_bounded() {
        let store = AuditStore::new();
        for i in 0..(MAX_POLICY_EVALUATIONS + 5) {
            store.append(record(&format!("r-{i}")));
        }
        assert_eq!(store.len(), MAX_POLICY_EVALUATIONS);
        // Oldest evicted first.
        assert!(store.find("r-0").is_none());
    }

    #[test]
    fn recent_returns_newest_last() {
        let store = AuditStore::new();
        for i in 0..10 {
            store.append(record(&format!("r-{i}")));
        }
        let recent = store.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[2].request_id, "r-9");
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let store = AuditStore::new();
        store.append(record("r-1"));
        let csv = store.export_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(AuditRecord::csv_header()));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn flush_snapshot_only_when_dirty() {
        let store = AuditStore::new();
        assert!(store.take_for_flush().is_none());
        store.append(record("r-1"));
        let snapshot = store.take_for_flush().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(store.take_for_flush().is_none());
    }

    #[tokio::test]
    async fn subscribers_receive_appends() {
        let store = AuditStore::new();
        let mut rx = store.subscribe();
        store.append(record("r-1"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.request_id, "r-1");
    }
}
