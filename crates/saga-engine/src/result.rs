use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::context::ContextSnapshot;
use crate::error::{ActionError, CompensationError, SagaError, StepFailure, render_chain};
use crate::run::StepStatus;

/// Status of a whole saga run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    #[default]
    Pending,
    Running,
    /// Every step completed.
    Completed,
    Compensating,
    /// A step failed and every compensation succeeded.
    Compensated,
    /// A step failed and at least one compensation failed too.
    Failed,
}

impl SagaStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Compensated | Self::Failed)
    }

    /// Whether the run left partial, unrecovered state behind.
    #[must_use]
    pub fn needs_intervention(self) -> bool {
        self == Self::Failed
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Compensating => "compensating",
            Self::Compensated => "compensated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step's action or compensation.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    step_name: String,
    status: StepStatus,
    #[serde(serialize_with = "serialize_error")]
    error: Option<ActionError>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    duration: Duration,
}

impl StepResult {
    pub(crate) fn new(
        step_name: &str,
        status: StepStatus,
        error: Option<ActionError>,
        duration: Duration,
    ) -> Self {
        Self {
            step_name: step_name.to_string(),
            status,
            error,
            duration,
        }
    }

    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    #[must_use]
    pub fn status(&self) -> StepStatus {
        self.status
    }

    #[must_use]
    pub fn error(&self) -> Option<&ActionError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        millis(self.duration)
    }
}

/// Everything a caller needs to know about a finished saga run.
///
/// Step and compensation failures are reported here rather than as errors.
#[derive(Debug, Clone, Serialize)]
pub struct SagaResult {
    pub(crate) saga_name: String,
    pub(crate) correlation_id: Option<String>,
    pub(crate) status: SagaStatus,
    pub(crate) steps: Vec<StepResult>,
    pub(crate) compensations: Vec<StepResult>,
    pub(crate) context: ContextSnapshot,
    #[serde(serialize_with = "serialize_failure")]
    pub(crate) failure: Option<StepFailure>,
    #[serde(serialize_with = "serialize_compensation_errors")]
    pub(crate) compensation_errors: Vec<CompensationError>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub(crate) duration: Duration,
}

impl SagaResult {
    #[must_use]
    pub fn saga_name(&self) -> &str {
        &self.saga_name
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    #[must_use]
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Forward results in execution order. Ends with the failed step, if any.
    #[must_use]
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Rollback results in the order compensations ran (last completed first).
    ///
    /// Steps without a compensation appear with status `Completed`.
    #[must_use]
    pub fn compensations(&self) -> &[StepResult] {
        &self.compensations
    }

    #[must_use]
    pub fn context(&self) -> &ContextSnapshot {
        &self.context
    }

    /// The step failure that triggered compensation.
    #[must_use]
    pub fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }

    #[must_use]
    pub fn compensation_errors(&self) -> &[CompensationError] {
        &self.compensation_errors
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SagaStatus::Completed
    }

    #[must_use]
    pub fn is_compensated(&self) -> bool {
        self.status == SagaStatus::Compensated
    }

    #[must_use]
    pub fn needs_intervention(&self) -> bool {
        self.status.needs_intervention()
    }

    /// Where `step` ended up: its rollback outcome if it was walked during
    /// compensation, otherwise its forward outcome. `None` if it never ran.
    #[must_use]
    pub fn final_status(&self, step: &str) -> Option<StepStatus> {
        self.compensations
            .iter()
            .chain(&self.steps)
            .find(|result| result.step_name == step)
            .map(StepResult::status)
    }

    /// Convert into the final context on success or a [`SagaError`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::StepFailed` if the saga was compensated and
    /// `SagaError::CompensationFailed` if compensation also failed.
    pub fn into_result(self) -> Result<ContextSnapshot, SagaError> {
        let Some(failure) = self.failure else {
            return Ok(self.context);
        };
        if self.compensation_errors.is_empty() {
            Err(SagaError::StepFailed {
                step: failure.step,
                source: failure.error,
            })
        } else {
            Err(SagaError::CompensationFailed {
                failed_step: failure.step,
                step_error: failure.error,
                compensation_errors: self.compensation_errors,
            })
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(millis(*duration))
}

fn serialize_error<S: Serializer>(
    error: &Option<ActionError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let rendered = error.as_ref().map(|error| render_chain(error));
    rendered.serialize(serializer)
}

fn serialize_failure<S: Serializer>(
    failure: &Option<StepFailure>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let rendered = failure.as_ref().map(|failure| render_chain(failure));
    rendered.serialize(serializer)
}

fn serialize_compensation_errors<S: Serializer>(
    errors: &[CompensationError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let rendered: Vec<String> = errors.iter().map(|error| render_chain(error)).collect();
    rendered.serialize(serializer)
}
