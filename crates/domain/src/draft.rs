//! Copy-on-write drafts handed to reducers and projections.
//!
//! A user function receives a [`Draft`] of the current value. Reading it never
//! clones; the first mutable access clones the value once. The function then
//! reports what it did with an [`Update`].

use std::borrow::Cow;
use std::ops::{Deref, DerefMut};

use serde_json::Value;

/// A lazily cloned, mutable view of a borrowed value.
#[derive(Debug)]
pub struct Draft<'a, T: Clone> {
    inner: Cow<'a, T>,
}

impl<'a, T: Clone> Draft<'a, T> {
    pub fn new(original: &'a T) -> Self {
        Self {
            inner: Cow::Borrowed(original),
        }
    }

    /// True once the draft has been written to.
    pub fn is_modified(&self) -> bool {
        matches!(self.inner, Cow::Owned(_))
    }

    pub fn into_owned(self) -> T {
        self.inner.into_owned()
    }
}

impl<T: Clone> Deref for Draft<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Clone> DerefMut for Draft<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.inner.to_mut()
    }
}

/// What a reducer or projection did with its draft.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Use the (possibly mutated) draft as the result.
    Mutated,
    /// Use this object instead of the draft; must be a JSON object.
    Replaced(Value),
    /// Produce nothing. Projections keep the stored model unchanged;
    /// reducers fail with `REDUCER_RETURNED_VOID`.
    Discarded,
}

impl Update {
    /// Replacement from any serializable value.
    pub fn replace(value: impl serde::Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Update::Replaced(value),
            Err(_) => Update::Replaced(Value::Null),
        }
    }
}
