//! Aggregate definitions: a named bundle of decide/reduce functions plus
//! admission guards, assembled with [`AggregateBuilder`].

use std::collections::HashMap;
use std::future::Future;

use event_store::{DomainEvent, ExtendedDomainEvent, ExtendedState, State};
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::command::Command;
use crate::context::Context;
use crate::draft::{Draft, Update};
use crate::error::{BoxError, Error, ErrorCode, Result};
use crate::guard::{GuardMap, Mode};

/// Maps a command and the current (possibly provisional) state to one event.
pub type DecideFunction = Box<
    dyn Fn(&Context, &ExtendedState, &Command, Option<&Value>) -> std::result::Result<DomainEvent, BoxError>
        + Send
        + Sync,
>;

/// Folds one event into a draft of the state.
pub type ReduceFunction = Box<
    dyn Fn(&Context, &mut Draft<'_, State>, &ExtendedDomainEvent) -> std::result::Result<Update, BoxError>
        + Send
        + Sync,
>;

/// Future returned by a prepare hook.
pub type PrepareFuture = BoxFuture<'static, std::result::Result<Option<Value>, BoxError>>;

/// Optional async lookup run once before `decide`; its output is passed to
/// the decider as `prepared`.
pub type PrepareFunction = Box<dyn Fn(Context, Command) -> PrepareFuture + Send + Sync>;

/// An event-sourced aggregate type.
///
/// Deciders are keyed by command type and reducers by event type. Events
/// without a reducer leave the state unchanged.
pub struct Aggregate {
    name: String,
    deciders: HashMap<String, DecideFunction>,
    reducers: HashMap<String, ReduceFunction>,
    command_guards: GuardMap,
    event_guards: GuardMap,
    prepare: Option<PrepareFunction>,
}

impl Aggregate {
    /// Starts building an aggregate for ids of type `name`.
    pub fn builder(name: impl Into<String>) -> AggregateBuilder {
        AggregateBuilder::new(name)
    }

    /// The aggregate type this definition handles.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command types this aggregate can decide.
    pub fn command_types(&self) -> impl Iterator<Item = &str> {
        self.deciders.keys().map(String::as_str)
    }

    pub fn accepts_command(&self, state: &State, command: &Command, mode: Mode) -> bool {
        self.command_guards
            .accepts(&command.command_type, &state.state_type, mode)
    }

    pub fn accepts_event(&self, state: &State, event: &DomainEvent, mode: Mode) -> bool {
        self.event_guards
            .accepts(&event.event_type, &state.state_type, mode)
    }

    /// Runs the prepare hook, if any.
    pub async fn prepare(&self, ctx: &Context, command: &Command) -> Result<Option<Value>> {
        let Some(prepare) = &self.prepare else {
            return Ok(None);
        };
        prepare(ctx.clone(), command.clone()).await.map_err(|e| {
            Error::wrap(
                ErrorCode::CommandPrepareFailed,
                format!("prepare failed for command '{}'", command.command_type),
                e,
            )
        })
    }

    /// Decides the event for `command`.
    ///
    /// A missing decider, a decider error, or an event for another aggregate
    /// all fail with `EVENT_DECIDER_ERROR`.
    pub fn decide(
        &self,
        ctx: &Context,
        state: &ExtendedState,
        command: &Command,
        prepared: Option<&Value>,
    ) -> Result<DomainEvent> {
        let decider = self.deciders.get(&command.command_type).ok_or_else(|| {
            Error::new(
                ErrorCode::EventDeciderError,
                format!(
                    "aggregate '{}' has no decider for command '{}'",
                    self.name, command.command_type
                ),
            )
        })?;

        let event = decider(ctx, state, command, prepared).map_err(|e| {
            Error::wrap(
                ErrorCode::EventDeciderError,
                format!("decider for command '{}' failed", command.command_type),
                e,
            )
        })?;

        if event.id != command.id {
            return Err(Error::new(
                ErrorCode::EventDeciderError,
                format!(
                    "decider for command '{}' produced an event for {} instead of {}",
                    command.command_type, event.id, command.id
                ),
            ));
        }
        Ok(event)
    }

    /// Folds `event` into `state`, leaving the input untouched.
    pub fn reduce(&self, ctx: &Context, state: &State, event: &ExtendedDomainEvent) -> Result<State> {
        let Some(reducer) = self.reducers.get(&event.event_type) else {
            return Ok(state.clone());
        };

        let mut draft = Draft::new(state);
        let update = reducer(ctx, &mut draft, event).map_err(|e| {
            Error::wrap(
                ErrorCode::ReducerReturnedVoid,
                format!("reducer for event '{}' failed", event.event_type),
                e,
            )
        })?;

        let next = match update {
            Update::Mutated => draft.into_owned(),
            Update::Replaced(value) => State::from_replacement(&draft, value).ok_or_else(|| {
                Error::new(
                    ErrorCode::ReducerReturnedVoid,
                    format!(
                        "reducer for event '{}' returned a value that is not a state object",
                        event.event_type
                    ),
                )
            })?,
            Update::Discarded => {
                return Err(Error::new(
                    ErrorCode::ReducerReturnedVoid,
                    format!("reducer for event '{}' returned no state", event.event_type),
                ));
            }
        };

        if next.id != state.id {
            return Err(Error::new(
                ErrorCode::ReducerReturnedVoid,
                format!("reducer for event '{}' changed the aggregate id", event.event_type),
            ));
        }
        Ok(next)
    }
}

impl std::fmt::Debug for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregate")
            .field("name", &self.name)
            .field("commands", &self.deciders.keys().collect::<Vec<_>>())
            .field("events", &self.reducers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Aggregate`].
///
/// Registrations may come in any order; [`build`](AggregateBuilder::build)
/// rejects incomplete configurations.
#[derive(Default)]
pub struct AggregateBuilder {
    name: Option<String>,
    deciders: HashMap<String, DecideFunction>,
    reducers: HashMap<String, ReduceFunction>,
    command_guards: GuardMap,
    event_guards: GuardMap,
    prepare: Option<PrepareFunction>,
}

impl AggregateBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Registers the decider for `command_type`.
    pub fn decider<F>(mut self, command_type: impl Into<String>, decide: F) -> Self
    where
        F: Fn(&Context, &ExtendedState, &Command, Option<&Value>) -> std::result::Result<DomainEvent, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.deciders.insert(command_type.into(), Box::new(decide));
        self
    }

    /// Registers the reducer for `event_type`.
    pub fn reducer<F>(mut self, event_type: impl Into<String>, reduce: F) -> Self
    where
        F: Fn(&Context, &mut Draft<'_, State>, &ExtendedDomainEvent) -> std::result::Result<Update, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.reducers.insert(event_type.into(), Box::new(reduce));
        self
    }

    /// Marks `command_type` as able to create the aggregate.
    pub fn creates_with(mut self, command_type: impl Into<String>) -> Self {
        self.command_guards.allow_creator(command_type);
        self
    }

    /// Accepts `command_type` while the state is one of `state_types`.
    pub fn accept_command<S: AsRef<str>>(
        mut self,
        command_type: impl Into<String>,
        state_types: &[S],
    ) -> Self {
        self.command_guards.allow(command_type, state_types);
        self
    }

    /// Marks `event_type` as able to start a stream.
    pub fn created_by(mut self, event_type: impl Into<String>) -> Self {
        self.event_guards.allow_creator(event_type);
        self
    }

    /// Accepts `event_type` while the state is one of `state_types`.
    pub fn accept_event<S: AsRef<str>>(
        mut self,
        event_type: impl Into<String>,
        state_types: &[S],
    ) -> Self {
        self.event_guards.allow(event_type, state_types);
        self
    }

    /// Installs the prepare hook.
    pub fn prepare<F, Fut>(mut self, prepare: F) -> Self
    where
        F: Fn(Context, Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<Value>, BoxError>> + Send + 'static,
    {
        self.prepare = Some(Box::new(move |ctx: Context, command: Command| -> PrepareFuture {
            Box::pin(prepare(ctx, command))
        }));
        self
    }

    pub fn build(self) -> Result<Aggregate> {
        let name = self.name.filter(|n| is_required_builder_value(n)).ok_or_else(|| {
            Error::new(
                ErrorCode::InvalidBuilderConfiguration,
                "aggregate requires a non-empty type name",
            )
        })?;
        if self.deciders.is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidBuilderConfiguration,
                format!("aggregate '{name}' requires at least one decider"),
            ));
        }
        if self.reducers.is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidBuilderConfiguration,
                format!("aggregate '{name}' requires at least one reducer"),
            ));
        }

        Ok(Aggregate {
            name,
            deciders: self.deciders,
            reducers: self.reducers,
            command_guards: self.command_guards,
            event_guards: self.event_guards,
            prepare: self.prepare,
        })
    }
}

/// A required builder string is present and not blank.
pub(crate) fn is_required_builder_value(value: &str) -> bool {
    !value.trim().is_empty()
}
