use crate::{
    events::Event,
    snapshot::{
        Snapshot,
        ValidActions,
    },
};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
    },
};

#[cfg(test)]
mod tests;

/// One server response worth of state: the full replacement snapshot, the
/// events past the request's cursor, the refreshed action hints, and the
/// server's highest known sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPayload {
    pub snapshot: Snapshot,
    pub events: Vec<Event>,
    pub valid_actions: ValidActions,
    pub latest_seq: u64,
}

/// Sequence-ordered event log plus the latest snapshot and action hints.
/// Snapshot and valid actions are replaced wholesale on every write; events
/// are inserted by sequence number, first write wins, nothing is ever removed
/// or reordered.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    snapshot: Snapshot,
    valid_actions: ValidActions,
    events: BTreeMap<u64, Event>,
    cursor: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire store contents from a full-history payload.
    pub fn initialize(&self, payload: SyncPayload) {
        let mut inner = self.inner.lock().unwrap();
        let SyncPayload {
            snapshot,
            events,
            valid_actions,
            latest_seq,
        } = payload;
        inner.snapshot = snapshot;
        inner.valid_actions = valid_actions;
        inner.events = events.into_iter().map(|event| (event.seq, event)).collect();
        let highest_event_seq = inner.events.keys().next_back().copied().unwrap_or(0);
        inner.cursor = latest_seq.max(highest_event_seq);
    }

    /// Merge an incremental payload, returning the events that were actually
    /// new, in sequence order. Merging the same payload again is a no-op for
    /// the log and cursor, and any two payloads merged in either order
    /// converge to the same log and cursor.
    pub fn merge(&self, payload: SyncPayload) -> Vec<Event> {
        let mut inner = self.inner.lock().unwrap();
        let SyncPayload {
            snapshot,
            mut events,
            valid_actions,
            latest_seq,
        } = payload;
        inner.snapshot = snapshot;
        inner.valid_actions = valid_actions;
        events.sort_by_key(|event| event.seq);
        let mut appended = Vec::new();
        for event in events {
            if inner.events.contains_key(&event.seq) {
                continue;
            }
            inner.cursor = inner.cursor.max(event.seq);
            inner.events.insert(event.seq, event.clone());
            appended.push(event);
        }
        inner.cursor = inner.cursor.max(latest_seq);
        appended
    }

    /// Highest sequence number incorporated so far; the `since_seq` for the
    /// next incremental fetch.
    pub fn cursor(&self) -> u64 {
        self.inner.lock().unwrap().cursor
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().unwrap().snapshot.clone()
    }

    pub fn valid_actions(&self) -> ValidActions {
        self.inner.lock().unwrap().valid_actions.clone()
    }

    /// Events oldest-first, the storage and scan order.
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().events.values().cloned().collect()
    }

    /// Events newest-first, the usual display order.
    pub fn events_newest_first(&self) -> Vec<Event> {
        self.inner
            .lock()
            .unwrap()
            .events
            .values()
            .rev()
            .cloned()
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }
}
