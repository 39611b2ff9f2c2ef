use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContextError;

/// Shared workspace for one saga run.
///
/// Every step and every compensation of a run receives the same context, so a
/// value written by one step is visible to all later steps and to the
/// compensations that run during rollback. Keys keep their insertion order.
#[derive(Debug, Clone, Default)]
pub struct SagaContext {
    input: Value,
    correlation_id: Option<String>,
    data: IndexMap<String, Value>,
}

impl SagaContext {
    /// Create a context seeded with the saga's input payload.
    #[must_use]
    pub fn new(input: Value) -> Self {
        Self {
            input,
            correlation_id: None,
            data: IndexMap::new(),
        }
    }

    /// Label the context with the caller's correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// The payload the saga was started with.
    #[must_use]
    pub fn input(&self) -> &Value {
        &self.input
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Read a value and deserialize it into `T`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value cannot be deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ContextError> {
        decode(key, self.data.get(key))
    }

    /// Store a raw JSON value, returning the value it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(key.into(), value)
    }

    /// Serialize `value` and store it under `key`, returning the value it replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn insert<T>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<Value>, ContextError>
    where
        T: Serialize + ?Sized,
    {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(encoded) => Ok(self.data.insert(key, encoded)),
            Err(source) => Err(ContextError::Serialize { key, source }),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Copy the current state into an immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            input: self.input.clone(),
            data: self.data.clone(),
        }
    }

    pub(crate) fn into_snapshot(self) -> ContextSnapshot {
        ContextSnapshot {
            input: self.input,
            data: self.data,
        }
    }
}

/// Final state of a saga context, as returned in a [`SagaResult`](crate::SagaResult).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    input: Value,
    data: IndexMap<String, Value>,
}

impl ContextSnapshot {
    #[must_use]
    pub fn input(&self) -> &Value {
        &self.input
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Read a value and deserialize it into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value cannot be deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ContextError> {
        decode(key, self.data.get(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn decode<T: DeserializeOwned>(
    key: &str,
    value: Option<&Value>,
) -> Result<Option<T>, ContextError> {
    value
        .map(|value| {
            T::deserialize(value).map_err(|source| ContextError::Deserialize {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}
