//! Event bus: fans events out to every reactor of their aggregate type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    Context, Error, ErrorCode, Handler, Middleware, MiddlewareChain, Result,
    validate_extended_event,
};
use event_store::ExtendedDomainEvent;
use futures_util::future::BoxFuture;

use crate::processor::{EventPipeline, Reaction};
use crate::read_model::ReadModelStore;

/// Anything that reacts to events of one aggregate type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn aggregate_type(&self) -> &str;

    async fn handle(&self, ctx: &Context, event: &ExtendedDomainEvent) -> Result<Reaction>;
}

#[async_trait]
impl<R: ReadModelStore + 'static> EventHandler for EventPipeline<R> {
    fn aggregate_type(&self) -> &str {
        self.reactor().aggregate_type()
    }

    async fn handle(&self, ctx: &Context, event: &ExtendedDomainEvent) -> Result<Reaction> {
        EventPipeline::handle(self, ctx, event).await
    }
}

/// Routes each event to the handlers registered for its aggregate type.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    middleware: MiddlewareChain<ExtendedDomainEvent, Vec<Reaction>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler`; handlers of one type run in registration order.
    pub fn register<H: EventHandler + 'static>(&mut self, handler: H) {
        self.handlers
            .entry(handler.aggregate_type().to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn with_middleware<W: Middleware<ExtendedDomainEvent, Vec<Reaction>> + 'static>(
        mut self,
        middleware: W,
    ) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn handler_count(&self, aggregate_type: &str) -> usize {
        self.handlers.get(aggregate_type).map_or(0, Vec::len)
    }

    /// Validates `event` and runs it through every matching handler,
    /// stopping at the first failure.
    #[tracing::instrument(
        skip(self, ctx, event),
        fields(aggregate_id = %event.id, event_type = %event.event_type)
    )]
    pub async fn execute(&self, ctx: Context, event: ExtendedDomainEvent) -> Result<Vec<Reaction>> {
        validate_extended_event(&event)?;

        let handlers = match self.handlers.get(&event.id.aggregate_type) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => {
                return Err(Error::new(
                    ErrorCode::EventHandlerNotFound,
                    format!(
                        "no event handler registered for aggregate type '{}'",
                        event.id.aggregate_type
                    ),
                ));
            }
        };

        let terminal: Handler<ExtendedDomainEvent, Vec<Reaction>> = Arc::new(
            move |ctx: Context, event: ExtendedDomainEvent| -> BoxFuture<'static, Result<Vec<Reaction>>> {
                let handlers = handlers.clone();
                Box::pin(async move {
                    let mut reactions = Vec::with_capacity(handlers.len());
                    for handler in &handlers {
                        reactions.push(handler.handle(&ctx, &event).await?);
                    }
                    Ok(reactions)
                })
            },
        );
        self.middleware.apply(ctx, event, terminal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryReadModelStore;
    use crate::reactor::EventReactor;
    use chrono::Utc;
    use common::AggregateId;
    use domain::{BoxError, Command, CommandDispatcher, LoggingMiddleware, Update};
    use event_store::{DomainEvent, Version};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Command>>);

    #[async_trait]
    impl CommandDispatcher for Recorder {
        async fn dispatch(&self, _: &Context, command: Command) -> std::result::Result<(), BoxError> {
            self.0.lock().unwrap().push(command);
            Ok(())
        }
    }

    fn pipeline(label: &'static str, store: InMemoryReadModelStore) -> EventPipeline<InMemoryReadModelStore> {
        let reactor = EventReactor::builder("order")
            .projection("placed", label, |_, _, model| {
                model.set("seen", true);
                Ok(Update::Mutated)
            })
            .build()
            .unwrap();
        EventPipeline::new(reactor, store, Arc::new(Recorder::default()))
    }

    fn placed() -> ExtendedDomainEvent {
        DomainEvent::new("placed", AggregateId::generate("order")).extend(Version::first(), Utc::now())
    }

    #[tokio::test]
    async fn runs_every_reactor_in_order() {
        let store = InMemoryReadModelStore::new();
        let mut bus = EventBus::new().with_middleware(LoggingMiddleware);
        bus.register(pipeline("first", store.clone()));
        bus.register(pipeline("second", store.clone()));

        let reactions = bus.execute(Context::new(), placed()).await.unwrap();

        assert_eq!(reactions.len(), 2);
        assert_eq!(reactions[0].read_models[0].model_type, "first");
        assert_eq!(reactions[1].read_models[0].model_type, "second");
        assert_eq!(store.count("first").await, 1);
        assert_eq!(store.count("second").await, 1);
    }

    #[tokio::test]
    async fn unknown_aggregate_type_is_rejected() {
        let bus = EventBus::new();
        let err = bus.execute(Context::new(), placed()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EventHandlerNotFound);
    }

    #[tokio::test]
    async fn invalid_events_are_rejected() {
        let mut bus = EventBus::new();
        bus.register(pipeline("first", InMemoryReadModelStore::new()));

        let unversioned = DomainEvent::new("placed", AggregateId::generate("order"))
            .extend(Version::initial(), Utc::now());
        let err = bus.execute(Context::new(), unversioned).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidEventVersion);
    }
}
