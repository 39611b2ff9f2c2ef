use chrono::{DateTime, Utc};
use saga_engine::{SagaResult, SagaStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bookkeeping for one saga run, keyed by its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    correlation_id: String,
    saga_name: String,
    status: SagaStatus,
    attempts: u32,
    input: Value,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    failed_step: Option<String>,
    compensation_failures: Vec<String>,
}

impl RunRecord {
    pub(crate) fn started(
        correlation_id: String,
        saga_name: String,
        input: Value,
        attempts: u32,
    ) -> Self {
        Self {
            correlation_id,
            saga_name,
            status: SagaStatus::Running,
            attempts,
            input,
            started_at: Utc::now(),
            finished_at: None,
            failed_step: None,
            compensation_failures: Vec::new(),
        }
    }

    pub(crate) fn finish(&mut self, result: &SagaResult) {
        self.status = result.status();
        self.finished_at = Some(Utc::now());
        self.failed_step = result.failure().map(|failure| failure.step.clone());
        self.compensation_failures = result
            .compensation_errors()
            .iter()
            .map(|error| error.step.clone())
            .collect();
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    #[must_use]
    pub fn saga_name(&self) -> &str {
        &self.saga_name
    }

    #[must_use]
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// How many times this correlation id has been executed, starting at 1.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The input the most recent attempt was seeded with.
    #[must_use]
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// When the most recent attempt started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn failed_step(&self) -> Option<&str> {
        self.failed_step.as_deref()
    }

    /// Steps whose compensation failed, in the order compensation ran.
    #[must_use]
    pub fn compensation_failures(&self) -> &[String] {
        &self.compensation_failures
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, SagaStatus::Compensated | SagaStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use saga_engine::{Action, SagaBuilder, SagaContext, SagaStep, StepError, async_trait};
    use serde_json::json;

    use super::*;

    struct Succeed;

    #[async_trait]
    impl Action for Succeed {
        async fn run(&self, _ctx: &mut SagaContext) -> Result<(), StepError> {
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl Action for Fail {
        async fn run(&self, _ctx: &mut SagaContext) -> Result<(), StepError> {
            Err(StepError::new("boom"))
        }
    }

    #[tokio::test]
    async fn finish_copies_outcome_of_the_run() -> anyhow::Result<()> {
        let saga = SagaBuilder::new("checkout")
            .step(SagaStep::new("reserve", Succeed).with_compensation(Fail))
            .action("charge", Fail)
            .build()?;
        let mut record = RunRecord::started(
            "order-1".to_string(),
            "checkout".to_string(),
            json!({"sku": "widget"}),
            1,
        );
        assert_eq!(record.status(), SagaStatus::Running);
        assert!(!record.is_retryable());

        let result = saga.execute_correlated(json!({}), "order-1").await;
        record.finish(&result);

        assert_eq!(record.status(), SagaStatus::Failed);
        assert_eq!(record.failed_step(), Some("charge"));
        assert_eq!(record.compensation_failures(), ["reserve".to_string()]);
        assert!(record.finished_at().is_some());
        assert!(record.is_retryable());
        Ok(())
    }

    #[test]
    fn record_serializes_with_snake_case_status() -> anyhow::Result<()> {
        let record = RunRecord::started(
            "order-2".to_string(),
            "checkout".to_string(),
            json!(null),
            3,
        );

        let encoded = serde_json::to_value(&record)?;

        assert_eq!(encoded["status"], json!("running"));
        assert_eq!(encoded["attempts"], json!(3));
        assert_eq!(encoded["finished_at"], json!(null));
        let decoded: RunRecord = serde_json::from_value(encoded)?;
        assert_eq!(decoded, record);
        Ok(())
    }
}
