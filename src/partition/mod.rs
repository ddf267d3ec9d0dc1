//! Partition manager: maps a [`PartitionKey`] to a local consumer endpoint
//! (spec §3 "Partition key", §4.8).

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sentinel for each dimension of a [`PartitionKey`] meaning "not set".
pub const INVALID_ID: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub shared_query_id: u64,
    pub decomposed_query_id: u64,
    pub operator_id: u64,
    pub producer_subpartition_index: u64,
}

impl PartitionKey {
    pub fn new(
        shared_query_id: u64,
        decomposed_query_id: u64,
        operator_id: u64,
        producer_subpartition_index: u64,
    ) -> Self {
        Self { shared_query_id, decomposed_query_id, operator_id, producer_subpartition_index }
    }

    pub fn invalid() -> Self {
        Self {
            shared_query_id: INVALID_ID,
            decomposed_query_id: INVALID_ID,
            operator_id: INVALID_ID,
            producer_subpartition_index: INVALID_ID,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.shared_query_id != INVALID_ID
            && self.decomposed_query_id != INVALID_ID
            && self.operator_id != INVALID_ID
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.shared_query_id, self.decomposed_query_id, self.operator_id, self.producer_subpartition_index
        )
    }
}

/// A local endpoint reachable for a given partition: either a pipeline
/// stage's entry point (for sources feeding a query plan) or an
/// event-consumer callback (for a sink's event back-channel).
#[derive(Clone)]
pub enum LocalConsumer {
    Stage { query_id: u64, stage_id: crate::query_plan::StageId },
    EventConsumer(Arc<dyn Fn(crate::network::wire::Event) + Send + Sync>),
}

struct Registration {
    consumer: LocalConsumer,
    expected_producers: u32,
    registered_producers: u32,
}

/// Thread-safe registry; reader-writer locked via `DashMap`'s internal
/// sharded locks (spec §5 "Partition manager registry: shared;
/// reader-writer lock"). Iteration over the whole map is not
/// thread-safe and is reserved for diagnostics.
pub struct PartitionManager {
    registry: DashMap<PartitionKey, Registration>,
}

impl PartitionManager {
    pub fn new() -> Self {
        Self { registry: DashMap::new() }
    }

    /// Registers one producer's subpartition. `expected_producers` is the
    /// total number of producers that will eventually register under this
    /// key; the entry is removed once the last producer deregisters.
    pub fn register(&self, key: PartitionKey, consumer: LocalConsumer, expected_producers: u32) {
        let mut entry = self.registry.entry(key).or_insert_with(|| Registration {
            consumer: consumer.clone(),
            expected_producers,
            registered_producers: 0,
        });
        entry.registered_producers += 1;
        tracing::debug!(%key, registered = entry.registered_producers, expected = entry.expected_producers, "partition producer registered");
    }

    pub fn lookup(&self, key: &PartitionKey) -> Option<LocalConsumer> {
        self.registry.get(key).map(|r| r.consumer.clone())
    }

    pub fn is_registered(&self, key: &PartitionKey) -> bool {
        self.registry.contains_key(key)
    }

    /// Deregisters one producer; removes the entry entirely once the last
    /// producer has deregistered.
    pub fn deregister(&self, key: &PartitionKey) {
        let mut remove = false;
        if let Some(mut entry) = self.registry.get_mut(key) {
            entry.registered_producers = entry.registered_producers.saturating_sub(1);
            if entry.registered_producers == 0 {
                remove = true;
            }
        }
        if remove {
            self.registry.remove(key);
            tracing::debug!(%key, "partition fully deregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl Default for PartitionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u64) -> PartitionKey {
        PartitionKey::new(1, 1, i, 0)
    }

    #[test]
    fn register_lookup_deregister_roundtrip() {
        let pm = PartitionManager::new();
        let k = key(1);
        pm.register(k, LocalConsumer::Stage { query_id: 1, stage_id: crate::query_plan::StageId(0) }, 1);
        assert!(pm.is_registered(&k));
        assert!(pm.lookup(&k).is_some());
        pm.deregister(&k);
        assert!(!pm.is_registered(&k));
    }

    #[test]
    fn entry_survives_until_last_producer_deregisters() {
        let pm = PartitionManager::new();
        let k = key(2);
        let consumer = LocalConsumer::Stage { query_id: 1, stage_id: crate::query_plan::StageId(0) };
        pm.register(k, consumer.clone(), 2);
        pm.register(k, consumer, 2);
        pm.deregister(&k);
        assert!(pm.is_registered(&k), "one producer remains");
        pm.deregister(&k);
        assert!(!pm.is_registered(&k));
    }

    #[test]
    fn invalid_sentinel_is_not_valid() {
        assert!(!PartitionKey::invalid().is_valid());
        assert!(key(1).is_valid());
    }
}
