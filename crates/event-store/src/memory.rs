use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, ExtendedDomainEvent, Result, Snapshot, StoreError, Version, store::EventStore,
};

/// In-memory event store implementation for tests and embedded hosts.
///
/// Streams are kept per aggregate id; `save_event` is a compare-and-append
/// under a single write lock. Every snapshot written is retained so tests can
/// count writes; `get_snapshot` returns the latest.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<AggregateId, Vec<ExtendedDomainEvent>>>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, Vec<Snapshot>>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored across all aggregates.
    pub async fn event_count(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    /// Returns how many snapshots were written for an aggregate.
    pub async fn snapshot_count(&self, aggregate_id: &AggregateId) -> usize {
        self.snapshots
            .read()
            .await
            .get(aggregate_id)
            .map_or(0, Vec::len)
    }

    /// Returns every snapshot written for an aggregate, oldest first.
    pub async fn snapshots_for(&self, aggregate_id: &AggregateId) -> Vec<Snapshot> {
        self.snapshots
            .read()
            .await
            .get(aggregate_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drops all snapshots of an aggregate, forcing a full replay.
    pub async fn remove_snapshots(&self, aggregate_id: &AggregateId) {
        self.snapshots.write().await.remove(aggregate_id);
    }

    /// Clears all events and snapshots.
    pub async fn clear(&self) {
        self.streams.write().await.clear();
        self.snapshots.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_events(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<ExtendedDomainEvent>> {
        let streams = self.streams.read().await;
        let mut events: Vec<_> = streams
            .get(aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.version >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn get_last_event_version(&self, aggregate_id: &AggregateId) -> Result<Version> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(aggregate_id)
            .and_then(|stream| stream.last())
            .map_or(Version::initial(), |e| e.version))
    }

    async fn save_event(&self, event: ExtendedDomainEvent) -> Result<()> {
        let mut streams = self.streams.write().await;
        let stream = streams.entry(event.id.clone()).or_default();

        let current = stream.last().map_or(Version::initial(), |e| e.version);
        if current.checked_next() != Some(event.version) {
            tracing::debug!(
                aggregate_id = %event.id,
                attempted = %event.version,
                %current,
                "rejecting out-of-order append"
            );
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: event.id.clone(),
                expected: Version::new(event.version.as_i64().saturating_sub(1)),
                actual: current,
            });
        }

        stream.push(event);
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: &AggregateId) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(aggregate_id)
            .and_then(|history| history.last())
            .cloned())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots
            .entry(snapshot.aggregate_id().clone())
            .or_default()
            .push(snapshot);
        Ok(())
    }
}
