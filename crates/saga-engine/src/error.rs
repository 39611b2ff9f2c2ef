use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

type SharedSource = Arc<dyn StdError + Send + Sync + 'static>;

/// Failure reported by application code from an action or compensation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepError {
    message: String,
    #[source]
    source: Option<SharedSource>,
}

impl StepError {
    /// Create an error carrying only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, reusing its message.
    #[must_use]
    pub fn from_source<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Wrap an underlying error under a message describing what failed.
    #[must_use]
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ContextError> for StepError {
    fn from(error: ContextError) -> Self {
        Self::from_source(error)
    }
}

/// Why an action or compensation did not complete.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ActionError {
    /// The action returned an error.
    #[error(transparent)]
    Failed(#[from] StepError),

    /// The action ran longer than its step timeout and was cancelled.
    #[error("timed out after {timeout:?}")]
    TimedOut {
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// The saga-wide deadline elapsed while the action was running.
    #[error("saga deadline of {deadline:?} exceeded")]
    DeadlineExceeded {
        /// The configured deadline.
        deadline: Duration,
    },
}

impl ActionError {
    /// Whether the action was cut short by a time bound rather than failing itself.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. } | Self::DeadlineExceeded { .. })
    }
}

/// The forward step failure that triggered compensation.
#[derive(Debug, Clone, Error)]
#[error("step '{step}' failed")]
pub struct StepFailure {
    /// Name of the step that failed.
    pub step: String,
    /// The underlying failure.
    #[source]
    pub error: ActionError,
}

/// Error from a failed compensation operation.
#[derive(Debug, Clone, Error)]
#[error("compensation failed for step '{step}': {description}")]
pub struct CompensationError {
    /// Name of the step whose compensation failed.
    pub step: String,
    /// Description of what the compensation was trying to do.
    pub description: String,
    /// The underlying error.
    #[source]
    pub error: ActionError,
}

/// Error form of a saga that did not complete.
///
/// Produced by [`SagaResult::into_result`](crate::SagaResult::into_result) for
/// callers that prefer propagating failures with `?`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SagaError {
    /// A step failed and all compensations succeeded.
    #[error("step '{step}' failed")]
    StepFailed {
        /// Name of the step that failed.
        step: String,
        /// The error that caused the step to fail.
        #[source]
        source: ActionError,
    },

    /// A step failed and some compensations also failed.
    #[error("step '{failed_step}' failed, and {} compensation(s) also failed", compensation_errors.len())]
    CompensationFailed {
        /// Name of the step that originally failed.
        failed_step: String,
        /// The error from the failed step.
        step_error: ActionError,
        /// Errors from failed compensations.
        compensation_errors: Vec<CompensationError>,
    },
}

/// Programmer error detected while assembling a saga.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BuilderError {
    #[error("saga name must not be empty")]
    EmptyName,

    #[error("duplicate step '{step}' in saga '{saga}'")]
    DuplicateStep { saga: String, step: String },
}

/// Error converting a context value to or from JSON.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context value '{key}' does not match the requested type")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize context value '{key}'")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Render an error and its source chain on one line.
pub(crate) fn render_chain(error: &dyn StdError) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.ends_with(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}
