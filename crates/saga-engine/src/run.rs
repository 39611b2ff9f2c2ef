use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::result::SagaStatus;
use crate::saga::Saga;
use crate::step::SagaStep;

/// Status of a single step within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum StepStatus {
    /// Step has not started.
    #[default]
    Pending,
    /// Forward action in progress.
    Running,
    /// Forward action succeeded.
    Completed,
    /// Forward action or compensation failed.
    Failed,
    /// Compensation in progress.
    Compensating,
    /// Compensation succeeded.
    Compensated,
    /// Never reached because an earlier step failed.
    Skipped,
}

impl StepStatus {
    /// Single-character marker used in run summaries.
    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Pending => "·",
            Self::Running => "…",
            Self::Completed => "✓",
            Self::Failed => "✗",
            Self::Compensating => "↺",
            Self::Compensated => "↩",
            Self::Skipped => "-",
        }
    }
}

/// Mutable execution metadata of one step during one run.
#[derive(Debug, Clone, Default)]
pub struct StepState {
    name: String,
    status: StepStatus,
    error: Option<ActionError>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl StepState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn status(&self) -> StepStatus {
        self.status
    }

    /// The last failure of the action or compensation, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ActionError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the forward action or the compensation last finished.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Restore the state to `Pending` with no error and no timestamps.
    pub fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
    }

    pub(crate) fn record_start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn record_success(&mut self) {
        self.status = StepStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn record_failure(&mut self, error: ActionError) {
        self.status = StepStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn record_skipped(&mut self) {
        self.status = StepStatus::Skipped;
    }

    pub(crate) fn record_compensating(&mut self) {
        self.status = StepStatus::Compensating;
    }

    pub(crate) fn record_compensated(&mut self) {
        self.status = StepStatus::Compensated;
        self.completed_at = Some(Utc::now());
    }
}

/// Per-run state of every step of a saga, indexed in declaration order.
///
/// [`Saga::execute`] allocates a fresh run each time. A run can also be kept
/// by the caller and passed to [`Saga::execute_in`], which resets it first;
/// afterwards it shows where every step ended up, including skipped ones.
#[derive(Debug, Clone, Default)]
pub struct SagaRun {
    status: SagaStatus,
    states: Vec<StepState>,
}

impl SagaRun {
    /// Allocate pending state for every step of `saga`.
    #[must_use]
    pub fn for_saga(saga: &Saga) -> Self {
        Self::for_steps(saga.steps())
    }

    fn for_steps(steps: &[SagaStep]) -> Self {
        Self {
            status: SagaStatus::Pending,
            states: steps.iter().map(|step| StepState::new(step.name())).collect(),
        }
    }

    #[must_use]
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    #[must_use]
    pub fn states(&self) -> &[StepState] {
        &self.states
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<&StepState> {
        self.states.iter().find(|state| state.name == name)
    }

    /// Return the run and every step to `Pending`.
    pub fn reset(&mut self) {
        self.status = SagaStatus::Pending;
        for state in &mut self.states {
            state.reset();
        }
    }

    /// One line per step with a status glyph, for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for state in &self.states {
            lines.push(format!("{} {}", state.status.glyph(), state.name));
        }
        lines.join("\n")
    }

    /// Reset the run, reallocating it if it was built for different steps.
    pub(crate) fn prepare(&mut self, steps: &[SagaStep]) {
        let matches = self.states.len() == steps.len()
            && self
                .states
                .iter()
                .zip(steps)
                .all(|(state, step)| state.name == step.name());
        if matches {
            self.reset();
        } else {
            *self = Self::for_steps(steps);
        }
    }

    pub(crate) fn set_status(&mut self, status: SagaStatus) {
        self.status = status;
    }

    pub(crate) fn step_mut(&mut self, index: usize) -> &mut StepState {
        &mut self.states[index]
    }
}
