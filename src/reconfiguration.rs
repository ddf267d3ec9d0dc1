//! In-band reconfiguration: lifecycle transitions are carried as marker
//! tuples through the same queues as data, rather than out-of-band signals,
//! so a stage only reconfigures after it has drained every data task
//! enqueued ahead of the marker (spec §3).

use std::collections::HashMap;

/// One lifecycle action a reconfiguration marker carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconfigurationEvent {
    /// Flush partial operator state (e.g. emit all open window slices) but
    /// keep the handler alive.
    Drain,
    /// Swap in new operator configuration, then drain.
    UpdateAndDrain,
    /// Redirect a network sink to a newly placed downstream receiver.
    ConnectToNewReceiver,
    /// Tear the plan down without draining in-flight state.
    HardEnd,
    /// Drain fully, then tear the plan down.
    SoftEnd,
    /// Abort the plan after an unrecoverable fault.
    FailEnd,
}

/// Versioned set of reconfiguration events for one decomposed query,
/// distributed to every stage that must observe it before a new version
/// starts processing data (spec §3). A stage receives one marker instance
/// per upstream producer and decrements a shared countdown
/// (see [`crate::queue::WorkerPool::submit_reconfiguration`]); only the last
/// to arrive performs the transition.
#[derive(Debug, Default)]
pub struct ReconfigurationMarker {
    versions: HashMap<(u64, u64), Vec<ReconfigurationEvent>>,
}

impl ReconfigurationMarker {
    pub fn new() -> Self {
        Self { versions: HashMap::new() }
    }

    pub fn insert(&mut self, decomposed_query_id: u64, version: u64, events: Vec<ReconfigurationEvent>) {
        self.versions.insert((decomposed_query_id, version), events);
    }

    pub fn events_for(&self, decomposed_query_id: u64, version: u64) -> Option<&[ReconfigurationEvent]> {
        self.versions.get(&(decomposed_query_id, version)).map(|v| v.as_slice())
    }

    /// The version carried for `decomposed_query_id`, if this marker holds
    /// one. A marker built for a single query plan holds at most one.
    pub fn version_for(&self, decomposed_query_id: u64) -> Option<u64> {
        self.versions.keys().find(|(id, _)| *id == decomposed_query_id).map(|(_, version)| *version)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_stores_events_per_version() {
        let mut marker = ReconfigurationMarker::new();
        marker.insert(1, 1, vec![ReconfigurationEvent::Drain]);
        marker.insert(1, 2, vec![ReconfigurationEvent::SoftEnd]);
        assert_eq!(marker.events_for(1, 1), Some(&[ReconfigurationEvent::Drain][..]));
        assert_eq!(marker.events_for(1, 2), Some(&[ReconfigurationEvent::SoftEnd][..]));
        assert_eq!(marker.events_for(1, 3), None);
    }
}
