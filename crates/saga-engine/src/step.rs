use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::action::Action;

/// A named unit of work in a saga.
///
/// A step pairs a forward action with an optional compensation that undoes
/// it. A step without a compensation is a point of no return: it stays
/// completed when a later step fails.
///
/// Steps are immutable definitions. Status, errors and timestamps of a run
/// live in the run's [`SagaRun`](crate::SagaRun), so one definition can be
/// shared by any number of runs.
#[derive(Clone)]
pub struct SagaStep {
    name: String,
    action: Arc<dyn Action>,
    compensation: Option<Arc<dyn Action>>,
    timeout: Option<Duration>,
    compensation_timeout: Option<Duration>,
    compensation_description: Option<String>,
}

impl SagaStep {
    /// Create a step with a forward action and no compensation.
    #[must_use]
    pub fn new(name: impl Into<String>, action: impl Action + 'static) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
            compensation: None,
            timeout: None,
            compensation_timeout: None,
            compensation_description: None,
        }
    }

    /// Attach the action that undoes this step during rollback.
    #[must_use]
    pub fn with_compensation(mut self, compensation: impl Action + 'static) -> Self {
        self.compensation = Some(Arc::new(compensation));
        self
    }

    /// Bound the forward action. Exceeding it counts as a step failure.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the compensation separately from the forward action.
    #[must_use]
    pub fn with_compensation_timeout(mut self, timeout: Duration) -> Self {
        self.compensation_timeout = Some(timeout);
        self
    }

    /// Human-readable description of what compensation will do.
    #[must_use]
    pub fn with_compensation_description(mut self, description: impl Into<String>) -> Self {
        self.compensation_description = Some(description.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub fn compensation_timeout(&self) -> Option<Duration> {
        self.compensation_timeout
    }

    #[must_use]
    pub fn has_compensation(&self) -> bool {
        self.compensation.is_some()
    }

    #[must_use]
    pub fn compensation_description(&self) -> String {
        self.compensation_description
            .clone()
            .unwrap_or_else(|| format!("undo {}", self.name))
    }

    pub(crate) fn action(&self) -> &dyn Action {
        self.action.as_ref()
    }

    pub(crate) fn compensation(&self) -> Option<&dyn Action> {
        self.compensation.as_deref()
    }
}

impl fmt::Debug for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaStep")
            .field("name", &self.name)
            .field("has_compensation", &self.has_compensation())
            .field("timeout", &self.timeout)
            .field("compensation_timeout", &self.compensation_timeout)
            .finish_non_exhaustive()
    }
}
