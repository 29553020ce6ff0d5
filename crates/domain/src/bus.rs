//! Command bus: routes commands to the pipeline of their aggregate type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use event_store::EventStore;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::command::{Command, CommandReceipt};
use crate::context::Context;
use crate::error::{Error, ErrorCode, Result};
use crate::middleware::{Handler, Middleware, MiddlewareChain};
use crate::pipeline::CommandPipeline;
use crate::validation::{parse_command, validate_command};

/// Anything that can handle commands for one aggregate type.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The aggregate type whose commands this handler accepts.
    fn aggregate_type(&self) -> &str;

    async fn handle(&self, ctx: &Context, command: &Command) -> Result<CommandReceipt>;
}

#[async_trait]
impl<S: EventStore + 'static> CommandHandler for CommandPipeline<S> {
    fn aggregate_type(&self) -> &str {
        self.aggregate().name()
    }

    async fn handle(&self, ctx: &Context, command: &Command) -> Result<CommandReceipt> {
        CommandPipeline::handle(self, ctx, command).await
    }
}

/// Routes each command to the handler registered for its id's type.
#[derive(Default)]
pub struct CommandBus {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    middleware: MiddlewareChain<Command, CommandReceipt>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for its aggregate type, replacing any previous one.
    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        let aggregate_type = handler.aggregate_type().to_string();
        if self
            .handlers
            .insert(aggregate_type.clone(), Arc::new(handler))
            .is_some()
        {
            tracing::warn!(%aggregate_type, "replaced existing command handler");
        }
    }

    /// Adds a middleware around every command handled by this bus.
    pub fn with_middleware<W: Middleware<Command, CommandReceipt> + 'static>(
        mut self,
        middleware: W,
    ) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn has_handler(&self, aggregate_type: &str) -> bool {
        self.handlers.contains_key(aggregate_type)
    }

    /// Validates and routes `command`.
    #[tracing::instrument(
        skip(self, ctx, command),
        fields(aggregate_id = %command.id, command_type = %command.command_type)
    )]
    pub async fn execute(&self, ctx: Context, command: Command) -> Result<CommandReceipt> {
        validate_command(&command)?;

        let handler = self
            .handlers
            .get(&command.id.aggregate_type)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::CommandHandlerNotFound,
                    format!(
                        "no command handler registered for aggregate type '{}'",
                        command.id.aggregate_type
                    ),
                )
            })?;

        let terminal: Handler<Command, CommandReceipt> = Arc::new(
            move |ctx: Context, command: Command| -> BoxFuture<'static, Result<CommandReceipt>> {
                let handler = Arc::clone(&handler);
                Box::pin(async move { handler.handle(&ctx, &command).await })
            },
        );
        self.middleware.apply(ctx, command, terminal).await
    }

    /// Parses an untyped command and routes it.
    pub async fn execute_json(&self, ctx: Context, command: Value) -> Result<CommandReceipt> {
        let command = parse_command(command)?;
        self.execute(ctx, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::draft::Update;
    use crate::middleware::{LoggingMiddleware, Next};
    use common::AggregateId;
    use event_store::{DomainEvent, InMemoryEventStore, Version};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Aggregate {
        Aggregate::builder("counter")
            .decider("create", |_, _, cmd, _| Ok(DomainEvent::new("created", cmd.id.clone())))
            .reducer("created", |_, state, _| {
                state.state_type = "active".into();
                Ok(Update::Mutated)
            })
            .build()
            .unwrap()
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Middleware<Command, CommandReceipt> for Counting {
        async fn handle(
            &self,
            ctx: Context,
            command: Command,
            next: Next<Command, CommandReceipt>,
        ) -> Result<CommandReceipt> {
            self.0.fetch_add(1, Ordering::SeqCst);
            next(ctx, command).await
        }
    }

    #[tokio::test]
    async fn routes_by_aggregate_type() {
        let mut bus = CommandBus::new();
        bus.register(CommandPipeline::new(InMemoryEventStore::new(), counter()));

        let id = AggregateId::generate("counter");
        let receipt = bus
            .execute(Context::new(), Command::new("create", id.clone()))
            .await
            .unwrap();
        assert_eq!(receipt.id, id);
        assert_eq!(receipt.version, Version::first());
    }

    #[tokio::test]
    async fn unknown_aggregate_type_is_rejected() {
        let bus = CommandBus::new();
        let err = bus
            .execute(Context::new(), Command::new("create", AggregateId::generate("invoice")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CommandHandlerNotFound);
    }

    #[tokio::test]
    async fn invalid_commands_never_reach_handlers() {
        let mut bus = CommandBus::new();
        bus.register(CommandPipeline::new(InMemoryEventStore::new(), counter()));

        let bad_id = AggregateId::new("counter", "not-a-uuid");
        let err = bus
            .execute(Context::new(), Command::new("create", bad_id))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidAggregateId);

        let err = bus
            .execute_json(Context::new(), json!({"type": "create"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidAggregateId);
    }

    #[tokio::test]
    async fn middleware_wraps_every_command() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = CommandBus::new()
            .with_middleware(LoggingMiddleware)
            .with_middleware(Counting(calls.clone()));
        bus.register(CommandPipeline::new(InMemoryEventStore::new(), counter()));

        let id = AggregateId::generate("counter");
        bus.execute_json(
            Context::new(),
            json!({"type": "create", "id": {"type": "counter", "value": id.value}}),
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_replaces_handler() {
        let first = InMemoryEventStore::new();
        let second = InMemoryEventStore::new();
        let mut bus = CommandBus::new();
        bus.register(CommandPipeline::new(first.clone(), counter()));
        bus.register(CommandPipeline::new(second.clone(), counter()));

        bus.execute(Context::new(), Command::new("create", AggregateId::generate("counter")))
            .await
            .unwrap();

        assert_eq!(first.event_count().await, 0);
        assert_eq!(second.event_count().await, 1);
    }
}
