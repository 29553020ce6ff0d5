//! The per-reactor event pipeline: validate, prefetch, project, persist,
//! dispatch.

use std::sync::Arc;

use domain::{
    BoxError, Command, CommandDispatcher, Context, Error, ErrorCode, Result, validate_command,
    validate_extended_event,
};
use event_store::ExtendedDomainEvent;
use serde::Serialize;

use crate::filter::FindOptions;
use crate::reactor::{EventReactor, ProjectionTarget};
use crate::read_model::{ReadModel, ReadModelStore};

/// Outcome of one event passing through a reactor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reaction {
    /// Read models written for the event, in projection order.
    pub read_models: Vec<ReadModel>,

    /// Command handed to the dispatcher, if the policy issued one.
    pub dispatched: Option<Command>,
}

/// Feeds events of one aggregate type through a reactor.
///
/// Prefetch completes before any projection runs, and every read model is
/// persisted before the policy's command is dispatched.
pub struct EventPipeline<R: ReadModelStore> {
    reactor: Arc<EventReactor>,
    store: R,
    dispatcher: Arc<dyn CommandDispatcher>,
}

impl<R: ReadModelStore> EventPipeline<R> {
    pub fn new(
        reactor: impl Into<Arc<EventReactor>>,
        store: R,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Self {
        Self {
            reactor: reactor.into(),
            store,
            dispatcher,
        }
    }

    pub fn reactor(&self) -> &EventReactor {
        &self.reactor
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    #[tracing::instrument(
        skip(self, ctx, event),
        fields(aggregate_id = %event.id, event_type = %event.event_type, version = %event.version)
    )]
    pub async fn handle(&self, ctx: &Context, event: &ExtendedDomainEvent) -> Result<Reaction> {
        let result = self.run(ctx, event).await;
        match &result {
            Ok(reaction) => {
                metrics::counter!("events_reacted_total").increment(1);
                tracing::debug!(
                    read_models = reaction.read_models.len(),
                    dispatched = reaction.dispatched.is_some(),
                    "event handled"
                );
            }
            Err(e) => tracing::warn!(code = %e.code(), error = %e, "event reaction failed"),
        }
        result
    }

    async fn run(&self, ctx: &Context, event: &ExtendedDomainEvent) -> Result<Reaction> {
        validate_extended_event(event)?;
        if event.id.aggregate_type != self.reactor.aggregate_type() {
            return Err(Error::new(
                ErrorCode::EventHandlerNotFound,
                format!(
                    "reactor for '{}' cannot handle events of '{}'",
                    self.reactor.aggregate_type(),
                    event.id.aggregate_type
                ),
            ));
        }

        let prefetched = self.prefetch(ctx, event).await?;
        tracing::debug!(prefetched = prefetched.len(), "read models prefetched");

        let mut read_models = Vec::with_capacity(prefetched.len());
        for model in &prefetched {
            if let Some(projected) = self.reactor.project(ctx, event, model)? {
                read_models.push(projected);
            }
        }

        persist(&self.store, &read_models).await.map_err(|e| {
            Error::wrap(
                ErrorCode::SaveViewFailed,
                format!("read models for event '{}' cannot be saved", event.event_type),
                e,
            )
        })?;

        let dispatched = self.dispatch(ctx, event).await?;

        Ok(Reaction {
            read_models,
            dispatched,
        })
    }

    /// Loads every read model the projection map declares for the event.
    ///
    /// Missing models are replaced by a bare placeholder keyed by the event's
    /// aggregate id value; results are de-duplicated by `(type, id)`.
    pub async fn prefetch(&self, ctx: &Context, event: &ExtendedDomainEvent) -> Result<Vec<ReadModel>> {
        let mut models: Vec<ReadModel> = Vec::new();

        for target in self.reactor.targets(&event.event_type) {
            for model in self.fetch_target(ctx, event, target).await? {
                if !models.iter().any(|m| m.same_key(&model)) {
                    models.push(model);
                }
            }
        }
        Ok(models)
    }

    async fn fetch_target(
        &self,
        ctx: &Context,
        event: &ExtendedDomainEvent,
        target: &ProjectionTarget,
    ) -> Result<Vec<ReadModel>> {
        let model_type = target.read_model_type.as_str();
        let fetch_failed = |e: BoxError| {
            Error::wrap(
                ErrorCode::ReadModelFetchFailed,
                format!("read models of type '{model_type}' cannot be fetched"),
                e,
            )
        };

        let found = match &target.filter {
            None => self
                .store
                .find_by_id(model_type, &event.id.value)
                .await
                .map_err(|e| fetch_failed(e.into()))?
                .into_iter()
                .collect::<Vec<_>>(),
            Some(filter) => {
                let clause = filter(ctx, event).map_err(fetch_failed)?;
                self.store
                    .find_many(model_type, &FindOptions::from(clause))
                    .await
                    .map_err(|e| fetch_failed(e.into()))?
            }
        };

        if found.is_empty() {
            return Ok(vec![ReadModel::new(model_type, event.id.value.clone())]);
        }
        Ok(found)
    }

    async fn dispatch(&self, ctx: &Context, event: &ExtendedDomainEvent) -> Result<Option<Command>> {
        let Some(command) = self.reactor.policy(ctx, event)? else {
            return Ok(None);
        };

        validate_command(&command).map_err(|e| {
            Error::wrap(
                ErrorCode::PolicyExecutionFailed,
                format!("policy for event '{}' issued an invalid command", event.event_type),
                e,
            )
        })?;

        self.dispatcher
            .dispatch(ctx, command.clone())
            .await
            .map_err(|e| {
                Error::wrap(
                    ErrorCode::CommandDispatchFailed,
                    format!("command '{}' cannot be dispatched", command.command_type),
                    e,
                )
            })?;

        metrics::counter!("commands_dispatched_total").increment(1);
        tracing::debug!(command_type = %command.command_type, target = %command.id, "command dispatched");
        Ok(Some(command))
    }
}

/// Validates and writes read models in order, stopping at the first failure.
pub async fn persist<R: ReadModelStore + ?Sized>(store: &R, models: &[ReadModel]) -> Result<()> {
    for model in models {
        if model.model_type.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidReadModelType,
                "read model type must not be empty",
            ));
        }
        if model.id.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidReadModelId,
                format!("read model of type '{}' has an empty id", model.model_type),
            ));
        }

        store.save(model.clone()).await.map_err(|e| {
            Error::wrap(
                ErrorCode::ModelSaveFailed,
                format!("read model {}:{} cannot be saved", model.model_type, model.id),
                e,
            )
        })?;
        metrics::counter!("read_models_saved_total").increment(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryReadModelStore;

    #[tokio::test]
    async fn persist_rejects_invalid_models() {
        let store = InMemoryReadModelStore::new();

        let err = persist(&store, &[ReadModel::new("", "x")]).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidReadModelType);

        let err = persist(&store, &[ReadModel::new("summary", " ")]).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidReadModelId);

        assert_eq!(store.count("summary").await, 0);
    }

    #[tokio::test]
    async fn persist_writes_in_order() {
        let store = InMemoryReadModelStore::new();
        persist(
            &store,
            &[ReadModel::new("summary", "a"), ReadModel::new("summary", "b")],
        )
        .await
        .unwrap();
        assert_eq!(store.count("summary").await, 2);
    }
}
