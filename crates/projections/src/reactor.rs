//! Event reactors: policies and projections for one aggregate type, plus the
//! projection map declaring which read models each event needs.

use std::collections::HashMap;

use domain::{BoxError, Command, Context, Draft, Error, ErrorCode, Result, Update};
use event_store::ExtendedDomainEvent;

use crate::filter::Where;
use crate::read_model::ReadModel;

/// Reacts to an event with at most one command.
pub type PolicyFunction = Box<
    dyn Fn(&Context, &ExtendedDomainEvent) -> std::result::Result<Option<Command>, BoxError>
        + Send
        + Sync,
>;

/// Applies an event to a draft of one read model.
pub type ProjectionFunction = Box<
    dyn Fn(&Context, &ExtendedDomainEvent, &mut Draft<'_, ReadModel>) -> std::result::Result<Update, BoxError>
        + Send
        + Sync,
>;

/// Selects the read models an event needs when their id is not the
/// aggregate id.
pub type WhereFunction =
    Box<dyn Fn(&Context, &ExtendedDomainEvent) -> std::result::Result<Where, BoxError> + Send + Sync>;

/// How the models of one read-model type are located for an event.
pub struct ProjectionTarget {
    pub read_model_type: String,
    pub filter: Option<WhereFunction>,
}

impl std::fmt::Debug for ProjectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionTarget")
            .field("read_model_type", &self.read_model_type)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Policies and projections keyed by event type for one aggregate type.
pub struct EventReactor {
    aggregate_type: String,
    policies: HashMap<String, PolicyFunction>,
    projections: HashMap<(String, String), ProjectionFunction>,
    projection_map: HashMap<String, Vec<ProjectionTarget>>,
}

impl EventReactor {
    pub fn builder(aggregate_type: impl Into<String>) -> ReactorBuilder {
        ReactorBuilder::new(aggregate_type)
    }

    /// The aggregate type whose events this reactor consumes.
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    /// The read models to prefetch for `event_type`; empty if none.
    pub fn targets(&self, event_type: &str) -> &[ProjectionTarget] {
        self.projection_map
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Runs the policy for the event's type, if any.
    pub fn policy(&self, ctx: &Context, event: &ExtendedDomainEvent) -> Result<Option<Command>> {
        let Some(policy) = self.policies.get(&event.event_type) else {
            return Ok(None);
        };
        policy(ctx, event).map_err(|e| {
            Error::wrap(
                ErrorCode::PolicyExecutionFailed,
                format!("policy for event '{}' failed", event.event_type),
                e,
            )
        })
    }

    /// Projects `event` onto `model`.
    ///
    /// Returns `None` when the projection discarded the model or no
    /// projection is registered for the pair.
    pub fn project(
        &self,
        ctx: &Context,
        event: &ExtendedDomainEvent,
        model: &ReadModel,
    ) -> Result<Option<ReadModel>> {
        let key = (event.event_type.clone(), model.model_type.clone());
        let Some(projection) = self.projections.get(&key) else {
            return Ok(None);
        };

        let mut draft = Draft::new(model);
        let update = projection(ctx, event, &mut draft).map_err(|e| {
            Error::wrap(
                ErrorCode::ProjectionExecutionFailed,
                format!(
                    "projection of event '{}' onto '{}' failed",
                    event.event_type, model.model_type
                ),
                e,
            )
        })?;

        match update {
            Update::Mutated => Ok(Some(draft.into_owned())),
            Update::Replaced(value) => ReadModel::from_replacement(&draft, value)
                .map(Some)
                .ok_or_else(|| {
                    Error::new(
                        ErrorCode::InvalidReadModel,
                        format!(
                            "projection of event '{}' onto '{}' returned a value that is not a read model",
                            event.event_type, model.model_type
                        ),
                    )
                }),
            Update::Discarded => Ok(None),
        }
    }
}

impl std::fmt::Debug for EventReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReactor")
            .field("aggregate_type", &self.aggregate_type)
            .field("policies", &self.policies.keys().collect::<Vec<_>>())
            .field("projections", &self.projections.keys().collect::<Vec<_>>())
            .field("projection_map", &self.projection_map)
            .finish()
    }
}

/// Builder for [`EventReactor`].
#[derive(Default)]
pub struct ReactorBuilder {
    aggregate_type: String,
    policies: HashMap<String, PolicyFunction>,
    projections: HashMap<(String, String), ProjectionFunction>,
    projection_map: HashMap<String, Vec<ProjectionTarget>>,
}

impl ReactorBuilder {
    pub fn new(aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            ..Default::default()
        }
    }

    /// Registers the policy for `event_type`.
    pub fn policy<F>(mut self, event_type: impl Into<String>, policy: F) -> Self
    where
        F: Fn(&Context, &ExtendedDomainEvent) -> std::result::Result<Option<Command>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.policies.insert(event_type.into(), Box::new(policy));
        self
    }

    /// Registers the projection of `event_type` onto `read_model_type`.
    ///
    /// Unless the pair is also registered with [`fetch_where`](Self::fetch_where),
    /// the model is fetched by the event's aggregate id.
    pub fn projection<F>(
        mut self,
        event_type: impl Into<String>,
        read_model_type: impl Into<String>,
        projection: F,
    ) -> Self
    where
        F: Fn(&Context, &ExtendedDomainEvent, &mut Draft<'_, ReadModel>) -> std::result::Result<Update, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.projections
            .insert((event_type.into(), read_model_type.into()), Box::new(projection));
        self
    }

    /// Fetches models of `read_model_type` for `event_type` by the event's
    /// aggregate id.
    pub fn fetch(mut self, event_type: impl Into<String>, read_model_type: impl Into<String>) -> Self {
        self.projection_map
            .entry(event_type.into())
            .or_default()
            .push(ProjectionTarget {
                read_model_type: read_model_type.into(),
                filter: None,
            });
        self
    }

    /// Fetches models of `read_model_type` for `event_type` with a filter
    /// computed from the event.
    pub fn fetch_where<F>(
        mut self,
        event_type: impl Into<String>,
        read_model_type: impl Into<String>,
        filter: F,
    ) -> Self
    where
        F: Fn(&Context, &ExtendedDomainEvent) -> std::result::Result<Where, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.projection_map
            .entry(event_type.into())
            .or_default()
            .push(ProjectionTarget {
                read_model_type: read_model_type.into(),
                filter: Some(Box::new(filter)),
            });
        self
    }

    pub fn build(mut self) -> Result<EventReactor> {
        if self.aggregate_type.trim().is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidBuilderConfiguration,
                "reactor requires a non-empty aggregate type",
            ));
        }
        if self.policies.is_empty() && self.projections.is_empty() {
            return Err(Error::new(
                ErrorCode::InvalidBuilderConfiguration,
                format!(
                    "reactor for '{}' requires at least one policy or projection",
                    self.aggregate_type
                ),
            ));
        }

        for (event_type, targets) in &self.projection_map {
            for target in targets {
                let key = (event_type.clone(), target.read_model_type.clone());
                if !self.projections.contains_key(&key) {
                    return Err(Error::new(
                        ErrorCode::InvalidBuilderConfiguration,
                        format!(
                            "read model '{}' is fetched for event '{event_type}' but has no projection",
                            target.read_model_type
                        ),
                    ));
                }
            }
        }

        for (event_type, read_model_type) in self.projections.keys() {
            let targets = self.projection_map.entry(event_type.clone()).or_default();
            if !targets.iter().any(|t| &t.read_model_type == read_model_type) {
                targets.push(ProjectionTarget {
                    read_model_type: read_model_type.clone(),
                    filter: None,
                });
            }
        }

        Ok(EventReactor {
            aggregate_type: self.aggregate_type,
            policies: self.policies,
            projections: self.projections,
            projection_map: self.projection_map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::AggregateId;
    use event_store::{DomainEvent, Version};
    use serde_json::json;

    fn event(event_type: &str) -> ExtendedDomainEvent {
        DomainEvent::new(event_type, AggregateId::generate("order")).extend(Version::first(), Utc::now())
    }

    fn reactor() -> EventReactor {
        EventReactor::builder("order")
            .policy("placed", |_, event| {
                Ok(Some(Command::new("reserve", AggregateId::generate("stock")).with_json(
                    json!({ "order": event.id.value }),
                )))
            })
            .policy("broken", |_, _| Err("boom".into()))
            .projection("placed", "summary", |_, _, model| {
                model.set("status", "placed");
                Ok(Update::Mutated)
            })
            .projection("cancelled", "summary", |_, _, _| Ok(Update::Discarded))
            .projection("renamed", "summary", |_, _, _| Ok(Update::Replaced(json!(42))))
            .build()
            .unwrap()
    }

    #[test]
    fn policy_runs_per_event_type() {
        let reactor = reactor();
        let command = reactor.policy(&Context::new(), &event("placed")).unwrap().unwrap();
        assert_eq!(command.command_type, "reserve");

        assert!(reactor.policy(&Context::new(), &event("shipped")).unwrap().is_none());

        let err = reactor.policy(&Context::new(), &event("broken")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyExecutionFailed);
    }

    #[test]
    fn projections_become_default_targets() {
        let reactor = reactor();
        let targets = reactor.targets("placed");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].read_model_type, "summary");
        assert!(targets[0].filter.is_none());
        assert!(reactor.targets("shipped").is_empty());
    }

    #[test]
    fn project_outcomes() {
        let reactor = reactor();
        let model = ReadModel::new("summary", "s-1");

        let projected = reactor
            .project(&Context::new(), &event("placed"), &model)
            .unwrap()
            .unwrap();
        assert_eq!(projected.get("status"), Some(&json!("placed")));
        assert!(model.get("status").is_none());

        assert!(reactor
            .project(&Context::new(), &event("cancelled"), &model)
            .unwrap()
            .is_none());

        let err = reactor
            .project(&Context::new(), &event("renamed"), &model)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidReadModel);
    }

    #[test]
    fn build_validates_configuration() {
        let empty = EventReactor::builder("order").build().unwrap_err();
        assert_eq!(empty.code(), ErrorCode::InvalidBuilderConfiguration);

        let unnamed = EventReactor::builder("")
            .policy("placed", |_, _| Ok(None))
            .build();
        assert!(unnamed.is_err());

        let orphan_fetch = EventReactor::builder("order")
            .policy("placed", |_, _| Ok(None))
            .fetch("placed", "summary")
            .build()
            .unwrap_err();
        assert_eq!(orphan_fetch.code(), ErrorCode::InvalidBuilderConfiguration);
    }
}
