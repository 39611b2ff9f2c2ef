use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::action::Action;
use crate::config::SagaConfig;
use crate::context::SagaContext;
use crate::error::{ActionError, CompensationError, StepFailure};
use crate::result::{SagaResult, SagaStatus, StepResult};
use crate::run::{SagaRun, StepStatus};
use crate::step::SagaStep;

/// A compiled saga ready for execution.
///
/// Sagas execute their steps in declaration order against one shared
/// [`SagaContext`]. If any step fails, previously completed steps are
/// compensated in reverse order (LIFO), and the outcome is returned as a
/// [`SagaResult`].
///
/// A `Saga` never mutates its step definitions, so it can be cloned cheaply
/// and executed any number of times, including concurrently.
#[derive(Clone)]
pub struct Saga {
    name: String,
    steps: Arc<[SagaStep]>,
    config: SagaConfig,
}

impl Saga {
    pub(crate) fn from_steps(name: String, steps: Vec<SagaStep>, config: SagaConfig) -> Self {
        Self {
            name,
            steps: steps.into(),
            config,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// A copy of this saga whose unset time bounds are taken from `defaults`.
    #[must_use]
    pub fn with_defaults(&self, defaults: &SagaConfig) -> Self {
        Self {
            name: self.name.clone(),
            steps: Arc::clone(&self.steps),
            config: self.config.or(defaults),
        }
    }

    /// Execute the saga with a fresh context seeded from `input`.
    pub async fn execute(&self, input: Value) -> SagaResult {
        let mut run = SagaRun::for_saga(self);
        self.execute_in(&mut run, input, None).await
    }

    /// Execute the saga, labelling the run with a correlation id.
    pub async fn execute_correlated(
        &self,
        input: Value,
        correlation_id: impl Into<String>,
    ) -> SagaResult {
        let mut run = SagaRun::for_saga(self);
        self.execute_in(&mut run, input, Some(correlation_id.into()))
            .await
    }

    /// Execute the saga, tracking step state in a caller-owned run.
    ///
    /// The run is reset before execution starts.
    pub async fn execute_in(
        &self,
        run: &mut SagaRun,
        input: Value,
        correlation_id: Option<String>,
    ) -> SagaResult {
        let span = info_span!(
            "saga",
            saga = %self.name,
            correlation_id = correlation_id.as_deref()
        );
        self.execute_internal(run, input, correlation_id)
            .instrument(span)
            .await
    }

    async fn execute_internal(
        &self,
        run: &mut SagaRun,
        input: Value,
        correlation_id: Option<String>,
    ) -> SagaResult {
        run.prepare(&self.steps);
        run.set_status(SagaStatus::Running);

        let started = Instant::now();
        let deadline = self
            .config
            .deadline()
            .map(|deadline| (started + deadline, deadline));
        let mut ctx = SagaContext::new(input);
        if let Some(id) = &correlation_id {
            ctx = ctx.with_correlation_id(id.clone());
        }

        info!(steps = self.steps.len(), "saga started");

        let mut forward = Vec::with_capacity(self.steps.len());
        let mut completed = Vec::with_capacity(self.steps.len());
        let mut failure = None;

        for (index, step) in self.steps.iter().enumerate() {
            debug!(step = step.name(), "executing step");
            run.step_mut(index).record_start();
            let step_started = Instant::now();

            let timeout = step.timeout().or(self.config.default_step_timeout());
            match run_bounded(step.action(), &mut ctx, timeout, deadline).await {
                Ok(()) => {
                    run.step_mut(index).record_success();
                    forward.push(StepResult::new(
                        step.name(),
                        StepStatus::Completed,
                        None,
                        step_started.elapsed(),
                    ));
                    completed.push(index);
                }
                Err(error) => {
                    warn!(step = step.name(), %error, "step failed");
                    run.step_mut(index).record_failure(error.clone());
                    forward.push(StepResult::new(
                        step.name(),
                        StepStatus::Failed,
                        Some(error.clone()),
                        step_started.elapsed(),
                    ));
                    for later in index + 1..self.steps.len() {
                        run.step_mut(later).record_skipped();
                    }
                    failure = Some(StepFailure {
                        step: step.name().to_string(),
                        error,
                    });
                    break;
                }
            }
        }

        let Some(failure) = failure else {
            run.set_status(SagaStatus::Completed);
            let duration = started.elapsed();
            info!(duration = ?duration, "saga completed");
            return SagaResult {
                saga_name: self.name.clone(),
                correlation_id,
                status: SagaStatus::Completed,
                steps: forward,
                compensations: Vec::new(),
                context: ctx.into_snapshot(),
                failure: None,
                compensation_errors: Vec::new(),
                duration,
            };
        };

        run.set_status(SagaStatus::Compensating);
        let (compensations, compensation_errors) =
            self.compensate(run, &mut ctx, &completed).await;

        let status = if compensation_errors.is_empty() {
            SagaStatus::Compensated
        } else {
            SagaStatus::Failed
        };
        run.set_status(status);

        let duration = started.elapsed();
        info!(
            %status,
            failed_step = %failure.step,
            compensation_failures = compensation_errors.len(),
            duration = ?duration,
            "saga rolled back"
        );

        SagaResult {
            saga_name: self.name.clone(),
            correlation_id,
            status,
            steps: forward,
            compensations,
            context: ctx.into_snapshot(),
            failure: Some(failure),
            compensation_errors,
            duration,
        }
    }

    /// Walk `completed` backwards, compensating every step that can be undone.
    ///
    /// A failed compensation is recorded and the walk continues with the
    /// earlier steps.
    async fn compensate(
        &self,
        run: &mut SagaRun,
        ctx: &mut SagaContext,
        completed: &[usize],
    ) -> (Vec<StepResult>, Vec<CompensationError>) {
        debug!(count = completed.len(), "compensating completed steps");

        let mut results = Vec::with_capacity(completed.len());
        let mut errors = Vec::new();

        for &index in completed.iter().rev() {
            let step = &self.steps[index];
            let Some(compensation) = step.compensation() else {
                debug!(step = step.name(), "step has no compensation, leaving it completed");
                results.push(StepResult::new(
                    step.name(),
                    StepStatus::Completed,
                    None,
                    Duration::ZERO,
                ));
                continue;
            };

            run.step_mut(index).record_compensating();
            let started = Instant::now();
            let timeout = step
                .compensation_timeout()
                .or(step.timeout())
                .or(self.config.compensation_timeout());

            match run_bounded(compensation, ctx, timeout, None).await {
                Ok(()) => {
                    debug!(step = step.name(), "step compensated");
                    run.step_mut(index).record_compensated();
                    results.push(StepResult::new(
                        step.name(),
                        StepStatus::Compensated,
                        None,
                        started.elapsed(),
                    ));
                }
                Err(error) => {
                    error!(
                        step = step.name(),
                        %error,
                        "compensation failed, continuing with remaining compensations"
                    );
                    run.step_mut(index).record_failure(error.clone());
                    results.push(StepResult::new(
                        step.name(),
                        StepStatus::Failed,
                        Some(error.clone()),
                        started.elapsed(),
                    ));
                    errors.push(CompensationError {
                        step: step.name().to_string(),
                        description: step.compensation_description(),
                        error,
                    });
                }
            }
        }

        (results, errors)
    }
}

impl fmt::Debug for Saga {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Saga")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("config", &self.config)
            .finish()
    }
}

/// Run `action` bounded by the earlier of its own timeout and the saga deadline.
///
/// When a bound fires the action's future is dropped, cancelling it.
async fn run_bounded(
    action: &dyn Action,
    ctx: &mut SagaContext,
    timeout: Option<Duration>,
    deadline: Option<(Instant, Duration)>,
) -> Result<(), ActionError> {
    let now = Instant::now();
    let step_limit = timeout.map(|timeout| (now + timeout, ActionError::TimedOut { timeout }));
    let deadline_limit =
        deadline.map(|(at, deadline)| (at, ActionError::DeadlineExceeded { deadline }));

    let limit = match (step_limit, deadline_limit) {
        (Some(step), Some(saga)) => Some(if saga.0 < step.0 { saga } else { step }),
        (step, saga) => step.or(saga),
    };

    let Some((at, elapsed)) = limit else {
        return action.run(ctx).await.map_err(ActionError::Failed);
    };
    if at <= now {
        return Err(elapsed);
    }
    match tokio::time::timeout_at(at, action.run(ctx)).await {
        Ok(outcome) => outcome.map_err(ActionError::Failed),
        Err(_) => Err(elapsed),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::builder::SagaBuilder;
    use crate::error::StepError;

    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<String>>,
    }

    impl Journal {
        fn push(&self, entry: String) {
            self.entries.lock().expect("journal lock").push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.entries.lock().expect("journal lock").clone()
        }
    }

    struct AddStep {
        name: &'static str,
        value: i64,
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl Action for AddStep {
        async fn run(&self, ctx: &mut SagaContext) -> Result<(), StepError> {
            let total = ctx.get_as::<i64>("total")?.unwrap_or_default();
            ctx.insert("total", &(total + self.value))?;
            self.journal.push(format!("execute {}", self.name));
            Ok(())
        }
    }

    struct UndoAdd {
        name: &'static str,
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl Action for UndoAdd {
        async fn run(&self, ctx: &mut SagaContext) -> Result<(), StepError> {
            let total = ctx.get_as::<i64>("total")?.unwrap_or_default();
            self.journal
                .push(format!("compensate {} at total {total}", self.name));
            Ok(())
        }
    }

    struct Fail(&'static str);

    #[async_trait]
    impl Action for Fail {
        async fn run(&self, _ctx: &mut SagaContext) -> Result<(), StepError> {
            Err(StepError::new(self.0))
        }
    }

    fn add(name: &'static str, value: i64, journal: &Arc<Journal>) -> SagaStep {
        SagaStep::new(
            name,
            AddStep {
                name,
                value,
                journal: Arc::clone(journal),
            },
        )
        .with_compensation(UndoAdd {
            name,
            journal: Arc::clone(journal),
        })
    }

    #[tokio::test]
    async fn all_steps_complete_in_declaration_order() -> anyhow::Result<()> {
        let journal = Arc::new(Journal::default());
        let saga = SagaBuilder::new("sum")
            .step(add("add_10", 10, &journal))
            .step(add("add_5", 5, &journal))
            .build()?;

        let result = saga.execute(json!({})).await;

        assert_eq!(result.status(), SagaStatus::Completed);
        assert_eq!(result.context().get_as::<i64>("total")?, Some(15));
        assert_eq!(journal.entries(), vec!["execute add_10", "execute add_5"]);
        assert!(result.compensations().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn compensation_happens_in_lifo_order_with_shared_context() -> anyhow::Result<()> {
        let journal = Arc::new(Journal::default());
        let saga = SagaBuilder::new("sum")
            .step(add("add_10", 10, &journal))
            .step(add("add_5", 5, &journal))
            .step(SagaStep::new("failing", Fail("boom")))
            .build()?;

        let result = saga.execute(json!({})).await;

        assert_eq!(result.status(), SagaStatus::Compensated);
        assert_eq!(
            journal.entries(),
            vec![
                "execute add_10",
                "execute add_5",
                "compensate add_5 at total 15",
                "compensate add_10 at total 15",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn first_step_failure_requires_no_compensation() -> anyhow::Result<()> {
        let journal = Arc::new(Journal::default());
        let saga = SagaBuilder::new("sum")
            .step(SagaStep::new("failing", Fail("immediate failure")))
            .step(add("add_10", 10, &journal))
            .build()?;

        let result = saga.execute(json!({})).await;

        assert_eq!(result.status(), SagaStatus::Compensated);
        assert!(result.compensations().is_empty());
        assert!(journal.entries().is_empty());
        let failure = result.failure().expect("failure recorded");
        assert_eq!(failure.step, "failing");
        Ok(())
    }

    #[tokio::test]
    async fn execute_in_tracks_state_of_every_step() -> anyhow::Result<()> {
        let journal = Arc::new(Journal::default());
        let saga = SagaBuilder::new("sum")
            .step(add("add_10", 10, &journal))
            .step(SagaStep::new("failing", Fail("boom")))
            .step(add("add_5", 5, &journal))
            .build()?;
        let mut run = SagaRun::for_saga(&saga);

        saga.execute_in(&mut run, json!({}), Some("req-1".to_string()))
            .await;

        assert_eq!(run.status(), SagaStatus::Compensated);
        let statuses: Vec<_> = run.states().iter().map(|s| s.status()).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Compensated,
                StepStatus::Failed,
                StepStatus::Skipped
            ]
        );
        assert!(run.state("add_5").and_then(|s| s.started_at()).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn with_defaults_keeps_steps_and_fills_config() -> anyhow::Result<()> {
        let saga = SagaBuilder::new("empty")
            .deadline(Duration::from_secs(10))
            .build()?;
        let defaults = SagaConfig::new()
            .with_deadline(Duration::from_secs(60))
            .with_compensation_timeout(Duration::from_secs(3));

        let configured = saga.with_defaults(&defaults);

        assert_eq!(configured.config().deadline(), Some(Duration::from_secs(10)));
        assert_eq!(
            configured.config().compensation_timeout(),
            Some(Duration::from_secs(3))
        );
        assert!(Arc::ptr_eq(&saga.steps, &configured.steps));
        Ok(())
    }
}
