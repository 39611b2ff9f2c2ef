use std::time::Duration;

/// Time bounds applied to a saga run.
///
/// All bounds are optional. Per-step timeouts set on a [`SagaStep`](crate::SagaStep)
/// take precedence over the defaults here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SagaConfig {
    default_step_timeout: Option<Duration>,
    compensation_timeout: Option<Duration>,
    deadline: Option<Duration>,
}

impl SagaConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout for forward actions of steps that do not declare one.
    #[must_use]
    pub fn default_step_timeout(&self) -> Option<Duration> {
        self.default_step_timeout
    }

    /// Timeout for compensations of steps that declare neither a
    /// compensation timeout nor a step timeout.
    #[must_use]
    pub fn compensation_timeout(&self) -> Option<Duration> {
        self.compensation_timeout
    }

    /// Wall-clock bound on the forward pass of a run.
    ///
    /// Compensation is never cut short by the deadline.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    #[must_use]
    pub fn with_default_step_timeout(mut self, timeout: Duration) -> Self {
        self.default_step_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_compensation_timeout(mut self, timeout: Duration) -> Self {
        self.compensation_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fill every unset bound from `fallback`.
    #[must_use]
    pub fn or(self, fallback: &SagaConfig) -> Self {
        Self {
            default_step_timeout: self.default_step_timeout.or(fallback.default_step_timeout),
            compensation_timeout: self.compensation_timeout.or(fallback.compensation_timeout),
            deadline: self.deadline.or(fallback.deadline),
        }
    }
}
