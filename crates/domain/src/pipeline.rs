//! The per-aggregate command pipeline: replay, decide, reduce, save.

use std::sync::Arc;
use std::time::Instant;

use common::AggregateId;
use event_store::{EventStore, ExtendedDomainEvent, ExtendedState, Snapshot, Version};

use crate::aggregate::Aggregate;
use crate::clock::{Clock, SystemClock};
use crate::command::{Command, CommandReceipt};
use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::error::{Error, ErrorCode, Result};
use crate::guard::Mode;
use crate::validation::{validate_command, validate_event};

/// State rebuilt from a snapshot and the events after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Replayed {
    pub state: ExtendedState,

    /// Version of the snapshot replay started from; `Version::initial()` if
    /// there was none.
    pub snapshot_version: Version,
}

/// Handles commands for one aggregate type against an event store.
///
/// Each invocation is independent; concurrent writers to the same aggregate
/// are serialized only by the version check in [`save`](Self::save).
pub struct CommandPipeline<S: EventStore> {
    store: S,
    aggregate: Arc<Aggregate>,
    clock: Arc<dyn Clock>,
    config: RuntimeConfig,
}

impl<S: EventStore> CommandPipeline<S> {
    /// Creates a pipeline with the system clock and default configuration.
    pub fn new(store: S, aggregate: impl Into<Arc<Aggregate>>) -> Self {
        Self {
            store,
            aggregate: aggregate.into(),
            clock: Arc::new(SystemClock),
            config: RuntimeConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn aggregate(&self) -> &Aggregate {
        &self.aggregate
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Runs `command` through the pipeline and appends exactly one event.
    #[tracing::instrument(
        skip(self, ctx, command),
        fields(aggregate_id = %command.id, command_type = %command.command_type)
    )]
    pub async fn handle(&self, ctx: &Context, command: &Command) -> Result<CommandReceipt> {
        let started = Instant::now();
        let result = self.run(ctx, command).await;
        metrics::histogram!("command_pipeline_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => {
                metrics::counter!("commands_handled_total").increment(1);
                tracing::debug!(version = %receipt.version, "command handled");
            }
            Err(e) => {
                metrics::counter!("commands_failed_total", "code" => e.code().as_str())
                    .increment(1);
                tracing::warn!(code = %e.code(), error = %e, "command failed");
            }
        }
        result
    }

    async fn run(&self, ctx: &Context, command: &Command) -> Result<CommandReceipt> {
        validate_command(command)?;
        if command.id.aggregate_type != self.aggregate.name() {
            return Err(Error::new(
                ErrorCode::CommandHandlerNotFound,
                format!(
                    "pipeline for '{}' cannot handle commands for '{}'",
                    self.aggregate.name(),
                    command.id.aggregate_type
                ),
            ));
        }

        let (replayed, mode) = match self.replay(ctx, &command.id).await {
            Ok(replayed) => (replayed, Mode::Update),
            Err(e) if e.is(ErrorCode::NoEventsStored) => {
                tracing::debug!("no events stored, taking the create path");
                let replayed = Replayed {
                    state: ExtendedState::provisional(command.id.clone()),
                    snapshot_version: Version::initial(),
                };
                (replayed, Mode::Create)
            }
            Err(e) => return Err(e),
        };
        let state = &replayed.state;

        let event = match mode {
            Mode::Create => {
                let prepared = self.aggregate.prepare(ctx, command).await?;
                let event = self
                    .aggregate
                    .decide(ctx, state, command, prepared.as_ref())?;
                self.check_command(state, command, mode)?;
                event
            }
            Mode::Update => {
                self.check_command(state, command, mode)?;
                let prepared = self.aggregate.prepare(ctx, command).await?;
                self.aggregate
                    .decide(ctx, state, command, prepared.as_ref())?
            }
        };

        validate_event(&event)?;
        if !self.aggregate.accepts_event(state, &event, mode) {
            return Err(Error::new(
                ErrorCode::EventNotAccepted,
                format!(
                    "event '{}' is not accepted in {mode} mode while in state '{}'",
                    event.event_type, state.state_type
                ),
            ));
        }

        let Some(version) = state.version.checked_next() else {
            return Err(Error::new(
                ErrorCode::EventsCannotBeSaved,
                format!("{} has no version left after {}", command.id, state.version),
            ));
        };
        let event = event.extend(version, self.clock.now());
        tracing::debug!(event_type = %event.event_type, version = %event.version, "event decided");

        let next = self
            .aggregate
            .reduce(ctx, state, &event)?
            .at_version(event.version);

        self.save(&next, event, replayed.snapshot_version).await?;

        Ok(CommandReceipt {
            id: command.id.clone(),
            version,
        })
    }

    fn check_command(&self, state: &ExtendedState, command: &Command, mode: Mode) -> Result<()> {
        if self.aggregate.accepts_command(state, command, mode) {
            return Ok(());
        }
        Err(Error::new(
            ErrorCode::CommandNotAccepted,
            format!(
                "command '{}' is not accepted in {mode} mode while in state '{}'",
                command.command_type, state.state_type
            ),
        ))
    }

    /// Rebuilds the state of `id` from its latest snapshot and the events
    /// stored after it.
    ///
    /// The snapshot is used only if the log still holds the event it was
    /// taken after; otherwise the whole stream is replayed. Fails with
    /// `NO_EVENTS_STORED` when no event is stored.
    #[tracing::instrument(skip(self, ctx), fields(aggregate_id = %id))]
    pub async fn replay(&self, ctx: &Context, id: &AggregateId) -> Result<Replayed> {
        let snapshot = self.store.get_snapshot(id).await.map_err(|e| {
            Error::wrap(
                ErrorCode::SnapshotCannotBeLoaded,
                format!("snapshot for {id} cannot be loaded"),
                e,
            )
        })?;

        let (mut state, snapshot_version, events) = match snapshot {
            Some(snapshot) => {
                let mut events = self.load_events(id, snapshot.version()).await?;
                if events.first().is_some_and(|first| snapshot.is_covered_by(first)) {
                    events.remove(0);
                    let version = snapshot.version();
                    (snapshot.into_state(), version, events)
                } else {
                    tracing::warn!(
                        snapshot_version = %snapshot.version(),
                        "snapshot not backed by the event log, replaying full stream"
                    );
                    let events = self.load_events(id, Version::first()).await?;
                    (ExtendedState::provisional(id.clone()), Version::initial(), events)
                }
            }
            None => {
                let events = self.load_events(id, Version::first()).await?;
                (ExtendedState::provisional(id.clone()), Version::initial(), events)
            }
        };

        if snapshot_version == Version::initial() && events.is_empty() {
            return Err(Error::new(
                ErrorCode::NoEventsStored,
                format!("no events stored for {id}"),
            ));
        }

        tracing::debug!(
            snapshot_version = %snapshot_version,
            events = events.len(),
            "replaying aggregate"
        );

        for event in &events {
            if state.version.checked_next() != Some(event.version) {
                return Err(Error::new(
                    ErrorCode::EventsCannotBeLoaded,
                    format!(
                        "event stream for {id} has a gap: found version {} after {}",
                        event.version, state.version
                    ),
                ));
            }
            state = self
                .aggregate
                .reduce(ctx, &state, event)?
                .at_version(event.version);
        }

        Ok(Replayed {
            state,
            snapshot_version,
        })
    }

    async fn load_events(&self, id: &AggregateId, from: Version) -> Result<Vec<ExtendedDomainEvent>> {
        self.store.get_events(id, from).await.map_err(|e| {
            Error::wrap(
                ErrorCode::EventsCannotBeLoaded,
                format!("events for {id} cannot be loaded"),
                e,
            )
        })
    }

    /// Returns the current state of `id`, or `None` if it was never created.
    pub async fn load(&self, ctx: &Context, id: &AggregateId) -> Result<Option<ExtendedState>> {
        match self.replay(ctx, id).await {
            Ok(replayed) => Ok(Some(replayed.state)),
            Err(e) if e.is(ErrorCode::NoEventsStored) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Appends `event` after the optimistic-concurrency checks, writing a
    /// snapshot first when `state` is `snapshot_interval` or more versions
    /// past `last_snapshot`.
    #[tracing::instrument(
        skip(self, state, event),
        fields(aggregate_id = %event.id, version = %event.version)
    )]
    pub async fn save(
        &self,
        state: &ExtendedState,
        event: ExtendedDomainEvent,
        last_snapshot: Version,
    ) -> Result<()> {
        if state.version != event.version {
            return Err(Error::new(
                ErrorCode::VersionMismatch,
                format!(
                    "state version {} does not match event version {}",
                    state.version, event.version
                ),
            ));
        }

        let last = self
            .store
            .get_last_event_version(&event.id)
            .await
            .map_err(|e| {
                Error::wrap(
                    ErrorCode::LastEventVersionCannotBeLoaded,
                    format!("last event version of {} cannot be loaded", event.id),
                    e,
                )
            })?;

        if last.checked_next() != Some(event.version) {
            return Err(Error::new(
                ErrorCode::EventVersionConflict,
                format!(
                    "event version {} conflicts with stored version {last}",
                    event.version
                ),
            ));
        }

        if self.should_snapshot(state.version, last_snapshot) {
            let snapshot = Snapshot::new(state.clone(), self.clock.now()).covering(event.clone());
            self.store.save_snapshot(snapshot).await.map_err(|e| {
                Error::wrap(
                    ErrorCode::SnapshotCannotBeSaved,
                    format!("snapshot of {} at version {} cannot be saved", state.id, state.version),
                    e,
                )
            })?;
            metrics::counter!("snapshots_saved_total").increment(1);
            tracing::info!(version = %state.version, "snapshot saved");
        }

        let aggregate_id = event.id.clone();
        self.store.save_event(event).await.map_err(|e| {
            if e.is_conflict() {
                Error::wrap(
                    ErrorCode::EventVersionConflict,
                    format!("concurrent write to {aggregate_id}"),
                    e,
                )
            } else {
                Error::wrap(
                    ErrorCode::EventsCannotBeSaved,
                    format!("event for {aggregate_id} cannot be saved"),
                    e,
                )
            }
        })?;
        metrics::counter!("events_appended_total").increment(1);

        Ok(())
    }

    fn should_snapshot(&self, version: Version, last_snapshot: Version) -> bool {
        self.config.snapshots_enabled()
            && version.distance_from(last_snapshot) >= self.config.snapshot_interval
    }
}
