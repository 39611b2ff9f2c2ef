use std::time::Duration;

use crate::action::Action;
use crate::config::SagaConfig;
use crate::error::BuilderError;
use crate::saga::Saga;
use crate::step::SagaStep;

/// Fluent builder for constructing sagas.
///
/// Steps run in the order they are added. Step names must be unique within a
/// saga; a duplicate is reported by [`build`](SagaBuilder::build) before the
/// saga can ever run.
///
/// ```
/// use saga_engine::{SagaBuilder, SagaStep, StepError, action_fn};
///
/// let saga = SagaBuilder::new("checkout")
///     .step(
///         SagaStep::new("reserve", action_fn(|ctx| Box::pin(async move {
///             ctx.set("reservation", serde_json::json!("r-1"));
///             Ok::<(), StepError>(())
///         })))
///         .with_compensation(action_fn(|ctx| Box::pin(async move {
///             ctx.remove("reservation");
///             Ok::<(), StepError>(())
///         }))),
///     )
///     .build()
///     .expect("step names are unique");
///
/// assert_eq!(saga.len(), 1);
/// ```
///
/// A saga cannot contain two steps with the same name:
///
/// ```
/// use saga_engine::{BuilderError, SagaBuilder, StepError, action_fn};
///
/// let noop = || action_fn(|_ctx| Box::pin(async { Ok::<(), StepError>(()) }));
/// let result = SagaBuilder::new("checkout")
///     .action("reserve", noop())
///     .action("reserve", noop())
///     .build();
///
/// assert!(matches!(result, Err(BuilderError::DuplicateStep { .. })));
/// ```
#[derive(Debug, Clone)]
pub struct SagaBuilder {
    name: String,
    steps: Vec<SagaStep>,
    config: SagaConfig,
    duplicate: Option<String>,
}

impl SagaBuilder {
    /// Create a builder for a saga called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            config: SagaConfig::default(),
            duplicate: None,
        }
    }

    /// Append a step.
    #[must_use]
    pub fn step(mut self, step: SagaStep) -> Self {
        if self.duplicate.is_none() && self.steps.iter().any(|s| s.name() == step.name()) {
            self.duplicate = Some(step.name().to_string());
        }
        self.steps.push(step);
        self
    }

    /// Append a step without compensation or timeout.
    #[must_use]
    pub fn action(self, name: impl Into<String>, action: impl Action + 'static) -> Self {
        self.step(SagaStep::new(name, action))
    }

    /// Replace all time bounds of the saga.
    #[must_use]
    pub fn config(mut self, config: SagaConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn default_step_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_default_step_timeout(timeout);
        self
    }

    #[must_use]
    pub fn compensation_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_compensation_timeout(timeout);
        self
    }

    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config = self.config.with_deadline(deadline);
        self
    }

    /// Build the saga from the accumulated steps.
    ///
    /// The builder is left intact; building again yields an independent saga
    /// sharing the same step definitions.
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::EmptyName` if the saga has no name and
    /// `BuilderError::DuplicateStep` if two steps share a name.
    pub fn build(&self) -> Result<Saga, BuilderError> {
        if self.name.is_empty() {
            return Err(BuilderError::EmptyName);
        }
        if let Some(step) = &self.duplicate {
            return Err(BuilderError::DuplicateStep {
                saga: self.name.clone(),
                step: step.clone(),
            });
        }
        Ok(Saga::from_steps(
            self.name.clone(),
            self.steps.clone(),
            self.config,
        ))
    }
}
