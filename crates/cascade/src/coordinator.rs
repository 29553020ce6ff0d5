//! Cascade coordinator: drives commands and the events they produce until
//! no policy issues another command.

use std::sync::Arc;
use std::time::Instant;

use domain::{
    Command, CommandBus, CommandReceipt, Context, Error, ErrorCode, Result, RuntimeConfig,
};
use event_store::{EventStore, EventStoreExt};
use projections::{EventBus, Reaction};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::queue::CommandQueue;

/// Everything one cascade did, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeReport {
    pub receipts: Vec<CommandReceipt>,
    pub reactions: Vec<Reaction>,
}

impl CascadeReport {
    /// Number of commands handled.
    pub fn steps(&self) -> usize {
        self.receipts.len()
    }
}

/// Bounded work loop feeding queued commands to the command bus and the
/// resulting events to the event bus.
///
/// Event pipelines must dispatch into the same [`CommandQueue`] the
/// coordinator drains. Cascades run one at a time.
pub struct CascadeCoordinator<S: EventStore> {
    commands: Arc<CommandBus>,
    events: Arc<EventBus>,
    store: S,
    queue: CommandQueue,
    config: RuntimeConfig,
    running: Mutex<()>,
}

impl<S: EventStore> CascadeCoordinator<S> {
    pub fn new(
        commands: impl Into<Arc<CommandBus>>,
        events: impl Into<Arc<EventBus>>,
        store: S,
        queue: CommandQueue,
    ) -> Self {
        Self {
            commands: commands.into(),
            events: events.into(),
            store,
            queue,
            config: RuntimeConfig::default(),
            running: Mutex::new(()),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Runs `command` and every command transitively issued by policies.
    ///
    /// Fails on the first failing command or reaction, or with
    /// `CASCADE_LIMIT_EXCEEDED` once `max_cascade_steps` commands have run and more
    /// are pending. On failure the remaining queue is discarded.
    #[tracing::instrument(
        skip(self, ctx, command),
        fields(command_type = %command.command_type, aggregate_id = %command.id)
    )]
    pub async fn run(&self, ctx: Context, command: Command) -> Result<CascadeReport> {
        let _guard = self.running.lock().await;

        let ctx = match ctx.correlation_id {
            Some(_) => ctx,
            None => ctx.with_correlation_id(uuid::Uuid::new_v4().to_string()),
        };
        self.queue.push(ctx, command).await;

        let started = Instant::now();
        let result = self.drain().await;
        metrics::histogram!("cascade_duration_seconds").record(started.elapsed().as_secs_f64());

        if result.is_err() {
            metrics::counter!("cascade_failures_total").increment(1);
            let dropped = self.queue.clear().await;
            if dropped > 0 {
                tracing::warn!(dropped, "discarded pending commands after cascade failure");
            }
        }
        result
    }

    async fn drain(&self) -> Result<CascadeReport> {
        let mut report = CascadeReport::default();

        while let Some((ctx, command)) = self.queue.pop().await {
            if report.steps() >= self.config.max_cascade_steps {
                return Err(Error::new(
                    ErrorCode::CascadeLimitExceeded,
                    format!(
                        "cascade exceeded {} commands; next was '{}' for {}",
                        self.config.max_cascade_steps, command.command_type, command.id
                    ),
                ));
            }
            metrics::counter!("cascade_steps_total").increment(1);

            let receipt = self.commands.execute(ctx.clone(), command).await?;
            let event = self
                .store
                .get_event(&receipt.id, receipt.version)
                .await
                .map_err(|e| {
                    Error::wrap(
                        ErrorCode::EventsCannotBeLoaded,
                        format!("event {} of {} cannot be loaded", receipt.version, receipt.id),
                        e,
                    )
                })?
                .ok_or_else(|| {
                    Error::new(
                        ErrorCode::EventsCannotBeLoaded,
                        format!("event {} of {} is missing", receipt.version, receipt.id),
                    )
                })?;

            if self.events.handler_count(&receipt.id.aggregate_type) > 0 {
                let reactions = self.events.execute(ctx, event).await?;
                report.reactions.extend(reactions);
            }
            report.receipts.push(receipt);
        }

        tracing::info!(steps = report.steps(), "cascade complete");
        Ok(report)
    }
}
