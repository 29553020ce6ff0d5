//! Filter, sort and range options for read-model queries.

use std::cmp::Ordering;

use common::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::read_model::ReadModel;

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Contains,
    StartsWith,
    EndsWith,
}

/// A single `field operator value` predicate.
///
/// A missing field reads as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn matches(&self, model: &ReadModel) -> bool {
        let actual = model.field(&self.field).unwrap_or(Value::Null);
        let expected = &self.value;

        match self.operator {
            Operator::Eq => values_equal(&actual, expected),
            Operator::Ne => !values_equal(&actual, expected),
            Operator::Gt => compare(&actual, expected) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                compare(&actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => compare(&actual, expected) == Some(Ordering::Less),
            Operator::Lte => matches!(
                compare(&actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::In => contains_value(expected, &actual),
            Operator::Nin => !contains_value(expected, &actual),
            Operator::Contains => match (&actual, expected) {
                (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
                (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
                _ => false,
            },
            Operator::StartsWith => match (&actual, expected) {
                (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
                _ => false,
            },
            Operator::EndsWith => match (&actual, expected) {
                (Value::String(s), Value::String(suffix)) => s.ends_with(suffix.as_str()),
                _ => false,
            },
        }
    }
}

/// The `where` clause of a projection-map entry.
///
/// Either one condition or a map of field to required value; both normalize
/// into a list of conditions that must all hold.
///
/// When deserialized, an object with exactly the keys `field`, `operator`
/// and `value`, whose `operator` is a known [`Operator`], is read as a
/// condition. An equality map over fields with those three names must be
/// built as [`Where::Fields`] in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Where {
    Condition(Condition),
    Fields(Payload),
}

impl Where {
    pub fn into_conditions(self) -> Vec<Condition> {
        match self {
            Where::Condition(condition) => vec![condition],
            Where::Fields(fields) => fields
                .into_iter()
                .map(|(field, value)| Condition::eq(field, value))
                .collect(),
        }
    }
}

impl From<Condition> for Where {
    fn from(condition: Condition) -> Self {
        Where::Condition(condition)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Window applied after filtering and sorting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// Options of [`ReadModelStore::find_many`](crate::ReadModelStore::find_many).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub filter: Vec<Condition>,
    #[serde(default)]
    pub sort: Vec<Sort>,
    #[serde(default)]
    pub range: Option<Range>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter.push(condition);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn range(mut self, limit: usize, offset: usize) -> Self {
        self.range = Some(Range {
            limit: Some(limit),
            offset,
        });
        self
    }

    pub fn matches(&self, model: &ReadModel) -> bool {
        self.filter.iter().all(|c| c.matches(model))
    }

    /// Filters, stably sorts and windows `models`.
    pub fn apply(&self, models: impl IntoIterator<Item = ReadModel>) -> Vec<ReadModel> {
        let mut selected: Vec<ReadModel> = models.into_iter().filter(|m| self.matches(m)).collect();

        if !self.sort.is_empty() {
            selected.sort_by(|a, b| {
                self.sort
                    .iter()
                    .map(|s| {
                        let ord = sort_order(&a.field(&s.field), &b.field(&s.field));
                        match s.direction {
                            Direction::Asc => ord,
                            Direction::Desc => ord.reverse(),
                        }
                    })
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        match self.range {
            Some(range) => selected
                .into_iter()
                .skip(range.offset)
                .take(range.limit.unwrap_or(usize::MAX))
                .collect(),
            None => selected,
        }
    }
}

impl From<Where> for FindOptions {
    fn from(clause: Where) -> Self {
        Self {
            filter: clause.into_conditions(),
            ..Default::default()
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn contains_value(list: &Value, value: &Value) -> bool {
    match list {
        Value::Array(items) => items.iter().any(|i| values_equal(i, value)),
        _ => false,
    }
}

/// Orders two values of the same kind; mixed kinds are incomparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting: missing < null < bool < number < string <
/// everything else.
fn sort_order(a: &Option<Value>, b: &Option<Value>) -> Ordering {
    fn rank(v: &Option<Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b))),
        _ => rank(a).cmp(&rank(b)),
    }
}
