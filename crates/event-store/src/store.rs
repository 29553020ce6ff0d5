use std::sync::Arc;

use async_trait::async_trait;

use crate::{AggregateId, ExtendedDomainEvent, Result, Snapshot, Version};

/// Append-only event log plus snapshot store for aggregates.
///
/// Injected by the host; the runtime never persists data itself. All
/// implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Retrieves the events of an aggregate with `version >= from_version`.
    ///
    /// Events are returned in ascending version order.
    async fn get_events(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<ExtendedDomainEvent>>;

    /// Returns the version of the last stored event, `Version::initial()` if none.
    async fn get_last_event_version(&self, aggregate_id: &AggregateId) -> Result<Version>;

    /// Appends one event to its aggregate stream.
    ///
    /// Implementations should reject an event whose version is not exactly
    /// one past the stream's last version with
    /// [`StoreError::ConcurrencyConflict`](crate::StoreError::ConcurrencyConflict).
    async fn save_event(&self, event: ExtendedDomainEvent) -> Result<()>;

    /// Retrieves the latest snapshot for an aggregate.
    async fn get_snapshot(&self, aggregate_id: &AggregateId) -> Result<Option<Snapshot>>;

    /// Saves a snapshot, superseding any earlier one for the same aggregate.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;
}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn get_events(
        &self,
        aggregate_id: &AggregateId,
        from_version: Version,
    ) -> Result<Vec<ExtendedDomainEvent>> {
        (**self).get_events(aggregate_id, from_version).await
    }

    async fn get_last_event_version(&self, aggregate_id: &AggregateId) -> Result<Version> {
        (**self).get_last_event_version(aggregate_id).await
    }

    async fn save_event(&self, event: ExtendedDomainEvent) -> Result<()> {
        (**self).save_event(event).await
    }

    async fn get_snapshot(&self, aggregate_id: &AggregateId) -> Result<Option<Snapshot>> {
        (**self).get_snapshot(aggregate_id).await
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        (**self).save_snapshot(snapshot).await
    }
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Retrieves every event of an aggregate.
    async fn get_all_events(&self, aggregate_id: &AggregateId) -> Result<Vec<ExtendedDomainEvent>> {
        self.get_events(aggregate_id, Version::initial()).await
    }

    /// Retrieves the event stored at exactly `version`, if any.
    async fn get_event(
        &self,
        aggregate_id: &AggregateId,
        version: Version,
    ) -> Result<Option<ExtendedDomainEvent>> {
        let events = self.get_events(aggregate_id, version).await?;
        Ok(events.into_iter().find(|e| e.version == version))
    }

    /// Checks if an aggregate exists (has any events).
    async fn aggregate_exists(&self, aggregate_id: &AggregateId) -> Result<bool> {
        Ok(self.get_last_event_version(aggregate_id).await? > Version::initial())
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}
