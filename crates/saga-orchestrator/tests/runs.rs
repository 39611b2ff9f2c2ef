//! Integration tests for executing, tracking and retrying runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use saga_engine::{
    Action, Saga, SagaBuilder, SagaConfig, SagaContext, SagaStatus, SagaStep, StepError,
    async_trait,
};
use saga_orchestrator::{
    InMemoryRunStore, OrchestratorConfig, OrchestratorError, RunRecord, RunStore, RunStoreError,
    SagaOrchestrator,
};
use serde_json::json;
use tokio::sync::Notify;

struct Succeed;

#[async_trait]
impl Action for Succeed {
    async fn run(&self, _ctx: &mut SagaContext) -> Result<(), StepError> {
        Ok(())
    }
}

/// Fails while the shared switch is on.
struct Flaky(Arc<AtomicBool>);

#[async_trait]
impl Action for Flaky {
    async fn run(&self, _ctx: &mut SagaContext) -> Result<(), StepError> {
        if self.0.load(Ordering::SeqCst) {
            return Err(StepError::new("payment provider unavailable"));
        }
        Ok(())
    }
}

struct Count(Arc<AtomicUsize>);

#[async_trait]
impl Action for Count {
    async fn run(&self, _ctx: &mut SagaContext) -> Result<(), StepError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct WaitFor(Arc<Notify>);

#[async_trait]
impl Action for WaitFor {
    async fn run(&self, _ctx: &mut SagaContext) -> Result<(), StepError> {
        self.0.notified().await;
        Ok(())
    }
}

/// Sleeps far longer than any test waits while the shared switch is on.
struct Hang(Arc<AtomicBool>);

#[async_trait]
impl Action for Hang {
    async fn run(&self, _ctx: &mut SagaContext) -> Result<(), StepError> {
        if self.0.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
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

struct BrokenStore;

#[async_trait]
impl RunStore for BrokenStore {
    async fn put(&self, _record: RunRecord) -> Result<(), RunStoreError> {
        Err(RunStoreError::new("write", "database unreachable"))
    }

    async fn get(&self, _correlation_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        Ok(None)
    }

    async fn list(&self) -> Result<Vec<RunRecord>, RunStoreError> {
        Ok(Vec::new())
    }
}

/// Fails the second write only, which is the terminal write of the first run.
#[derive(Default)]
struct LosesTerminalWrite {
    inner: InMemoryRunStore,
    puts: AtomicUsize,
}

#[async_trait]
impl RunStore for LosesTerminalWrite {
    async fn put(&self, record: RunRecord) -> Result<(), RunStoreError> {
        if self.puts.fetch_add(1, Ordering::SeqCst) == 1 {
            return Err(RunStoreError::new("write", "connection reset"));
        }
        self.inner.put(record).await
    }

    async fn get(&self, correlation_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        self.inner.get(correlation_id).await
    }

    async fn list(&self) -> Result<Vec<RunRecord>, RunStoreError> {
        self.inner.list().await
    }
}

fn hanging(hang: &Arc<AtomicBool>) -> anyhow::Result<Saga> {
    Ok(SagaBuilder::new("hanging")
        .action("wait", Hang(Arc::clone(hang)))
        .build()?)
}

fn checkout(failing: &Arc<AtomicBool>, compensations: &Arc<AtomicUsize>) -> anyhow::Result<Saga> {
    Ok(SagaBuilder::new("checkout")
        .step(
            SagaStep::new("reserve", Succeed)
                .with_compensation(Count(Arc::clone(compensations))),
        )
        .action("charge", Flaky(Arc::clone(failing)))
        .build()?)
}

#[tokio::test]
async fn unknown_saga_is_reported() -> anyhow::Result<()> {
    let orchestrator = SagaOrchestrator::in_memory();

    let err = orchestrator
        .execute("missing", json!({}))
        .await
        .expect_err("unknown saga");

    assert!(matches!(err, OrchestratorError::SagaNotFound { ref name } if name == "missing"));
    assert!(orchestrator.runs().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn completed_run_is_tracked_by_correlation_id() -> anyhow::Result<()> {
    let failing = Arc::new(AtomicBool::new(false));
    let compensations = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = SagaOrchestrator::in_memory();
    orchestrator.register("checkout", checkout(&failing, &compensations)?)?;

    let result = orchestrator
        .execute_correlated("checkout", "order-1", json!({"sku": "widget"}))
        .await?;

    assert_eq!(result.status(), SagaStatus::Completed);
    assert_eq!(result.correlation_id(), Some("order-1"));
    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.status(), SagaStatus::Completed);
    assert_eq!(record.saga_name(), "checkout");
    assert_eq!(record.attempts(), 1);
    assert_eq!(record.input(), &json!({"sku": "widget"}));
    assert!(record.failed_step().is_none());
    assert!(record.finished_at().is_some());
    assert!(orchestrator.run_status("order-2").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn rolled_back_run_records_the_failed_step() -> anyhow::Result<()> {
    let failing = Arc::new(AtomicBool::new(true));
    let compensations = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = SagaOrchestrator::in_memory();
    orchestrator.register("checkout", checkout(&failing, &compensations)?)?;

    let result = orchestrator
        .execute_correlated("checkout", "order-1", json!({}))
        .await?;

    assert_eq!(result.status(), SagaStatus::Compensated);
    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.status(), SagaStatus::Compensated);
    assert_eq!(record.failed_step(), Some("charge"));
    assert!(record.compensation_failures().is_empty());
    assert_eq!(compensations.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn retry_of_compensated_run_increments_attempts() -> anyhow::Result<()> {
    let failing = Arc::new(AtomicBool::new(true));
    let compensations = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = SagaOrchestrator::in_memory();
    orchestrator.register("checkout", checkout(&failing, &compensations)?)?;
    orchestrator
        .execute_correlated("checkout", "order-1", json!({"sku": "widget"}))
        .await?;

    failing.store(false, Ordering::SeqCst);
    let result = orchestrator.retry("order-1").await?;

    assert_eq!(result.status(), SagaStatus::Completed);
    assert_eq!(result.context().input(), &json!({"sku": "widget"}));
    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.attempts(), 2);
    assert_eq!(record.status(), SagaStatus::Completed);
    assert!(record.failed_step().is_none());
    assert_eq!(orchestrator.runs().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn completed_run_cannot_be_retried() -> anyhow::Result<()> {
    let failing = Arc::new(AtomicBool::new(false));
    let compensations = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = SagaOrchestrator::in_memory();
    orchestrator.register("checkout", checkout(&failing, &compensations)?)?;
    orchestrator
        .execute_correlated("checkout", "order-1", json!({}))
        .await?;

    let err = orchestrator
        .retry("order-1")
        .await
        .expect_err("completed run is final");

    assert!(matches!(
        err,
        OrchestratorError::NotRetryable {
            status: SagaStatus::Completed,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn retry_of_unknown_run_is_reported() {
    let orchestrator = SagaOrchestrator::in_memory();

    let err = orchestrator
        .retry("never-ran")
        .await
        .expect_err("unknown run");

    assert!(matches!(
        err,
        OrchestratorError::RunNotFound { ref correlation_id } if correlation_id == "never-ran"
    ));
}

#[tokio::test]
async fn same_correlation_id_cannot_run_twice_at_once() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let mut orchestrator = SagaOrchestrator::in_memory();
    orchestrator.register(
        "slow",
        SagaBuilder::new("slow")
            .action("wait", WaitFor(Arc::clone(&gate)))
            .build()?,
    )?;

    let (first, second) = tokio::join!(
        orchestrator.execute_correlated("slow", "order-1", json!({})),
        async {
            let second = orchestrator
                .execute_correlated("slow", "order-1", json!({}))
                .await;
            gate.notify_one();
            second
        }
    );

    assert_eq!(first?.status(), SagaStatus::Completed);
    assert!(matches!(
        second,
        Err(OrchestratorError::RunInProgress { ref correlation_id }) if correlation_id == "order-1"
    ));
    Ok(())
}

#[tokio::test]
async fn reusing_a_finished_correlation_id_starts_a_new_attempt() -> anyhow::Result<()> {
    let failing = Arc::new(AtomicBool::new(false));
    let compensations = Arc::new(AtomicUsize::new(0));
    let mut orchestrator = SagaOrchestrator::in_memory();
    orchestrator.register("checkout", checkout(&failing, &compensations)?)?;

    orchestrator
        .execute_correlated("checkout", "order-1", json!({}))
        .await?;
    orchestrator
        .execute_correlated("checkout", "order-1", json!({"again": true}))
        .await?;

    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.attempts(), 2);
    assert_eq!(record.input(), &json!({"again": true}));
    Ok(())
}

#[tokio::test]
async fn failed_compensations_are_listed_on_the_record() -> anyhow::Result<()> {
    let mut orchestrator = SagaOrchestrator::in_memory();
    orchestrator.register(
        "fragile",
        SagaBuilder::new("fragile")
            .step(SagaStep::new("reserve", Succeed).with_compensation(Fail))
            .action("charge", Fail)
            .build()?,
    )?;

    let result = orchestrator
        .execute_correlated("fragile", "order-1", json!({}))
        .await?;

    assert!(result.needs_intervention());
    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.status(), SagaStatus::Failed);
    assert_eq!(record.compensation_failures(), ["reserve".to_string()]);
    assert!(record.is_retryable());
    Ok(())
}

#[tokio::test]
async fn configured_defaults_fill_unset_saga_bounds() -> anyhow::Result<()> {
    let config = OrchestratorConfig::default().with_saga_defaults(
        SagaConfig::new()
            .with_default_step_timeout(Duration::from_secs(5))
            .with_deadline(Duration::from_secs(60)),
    );
    let mut orchestrator = SagaOrchestrator::with_config(config);
    orchestrator.register(
        "checkout",
        SagaBuilder::new("checkout")
            .deadline(Duration::from_secs(10))
            .action("only", Succeed)
            .build()?,
    )?;

    let saga = orchestrator.saga("checkout").expect("registered");

    assert_eq!(saga.config().deadline(), Some(Duration::from_secs(10)));
    assert_eq!(
        saga.config().default_step_timeout(),
        Some(Duration::from_secs(5))
    );
    Ok(())
}

#[tokio::test]
async fn bounded_store_from_config_evicts_old_runs() -> anyhow::Result<()> {
    let mut orchestrator =
        SagaOrchestrator::with_config(OrchestratorConfig::default().with_max_tracked_runs(2));
    orchestrator.register(
        "checkout",
        SagaBuilder::new("checkout").action("only", Succeed).build()?,
    )?;

    for id in ["a", "b", "c"] {
        orchestrator
            .execute_correlated("checkout", id, json!({}))
            .await?;
    }

    let ids: Vec<_> = orchestrator
        .runs()
        .await?
        .iter()
        .map(|r| r.correlation_id().to_string())
        .collect();
    assert_eq!(ids, vec!["b", "c"]);
    Ok(())
}

#[tokio::test]
async fn shared_store_is_visible_to_the_caller() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryRunStore::new());
    let mut orchestrator = SagaOrchestrator::new(Arc::clone(&store) as Arc<dyn RunStore>);
    orchestrator.register(
        "checkout",
        SagaBuilder::new("checkout").action("only", Succeed).build()?,
    )?;

    orchestrator
        .execute_correlated("checkout", "order-1", json!({}))
        .await?;

    let record = store.get("order-1").await?.expect("run recorded");
    assert_eq!(record.status(), SagaStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn store_failures_are_propagated() -> anyhow::Result<()> {
    let mut orchestrator = SagaOrchestrator::new(Arc::new(BrokenStore));
    orchestrator.register(
        "checkout",
        SagaBuilder::new("checkout").action("only", Succeed).build()?,
    )?;

    let err = orchestrator
        .execute("checkout", json!({}))
        .await
        .expect_err("store is broken");

    match err {
        OrchestratorError::Store(source) => assert_eq!(source.operation(), "write"),
        other => panic!("expected store error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn result_survives_a_failed_terminal_write() -> anyhow::Result<()> {
    let mut orchestrator = SagaOrchestrator::new(Arc::new(LosesTerminalWrite::default()));
    orchestrator.register(
        "checkout",
        SagaBuilder::new("checkout").action("only", Succeed).build()?,
    )?;

    let result = orchestrator
        .execute_correlated("checkout", "order-1", json!({}))
        .await?;

    assert_eq!(result.status(), SagaStatus::Completed);
    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.status(), SagaStatus::Running);

    let again = orchestrator
        .execute_correlated("checkout", "order-1", json!({}))
        .await?;

    assert_eq!(again.status(), SagaStatus::Completed);
    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.status(), SagaStatus::Completed);
    assert_eq!(record.attempts(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_can_be_executed_again() -> anyhow::Result<()> {
    let hang = Arc::new(AtomicBool::new(true));
    let mut orchestrator = SagaOrchestrator::in_memory();
    orchestrator.register("hanging", hanging(&hang)?)?;

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        orchestrator.execute_correlated("hanging", "order-1", json!({})),
    )
    .await;
    assert!(cancelled.is_err());
    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.status(), SagaStatus::Running);

    hang.store(false, Ordering::SeqCst);
    let result = orchestrator
        .execute_correlated("hanging", "order-1", json!({}))
        .await?;

    assert_eq!(result.status(), SagaStatus::Completed);
    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.status(), SagaStatus::Completed);
    assert_eq!(record.attempts(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_can_be_retried() -> anyhow::Result<()> {
    let hang = Arc::new(AtomicBool::new(true));
    let mut orchestrator = SagaOrchestrator::in_memory();
    orchestrator.register("hanging", hanging(&hang)?)?;

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        orchestrator.execute_correlated("hanging", "order-1", json!({"sku": "widget"})),
    )
    .await;
    assert!(cancelled.is_err());

    hang.store(false, Ordering::SeqCst);
    let result = orchestrator.retry("order-1").await?;

    assert_eq!(result.status(), SagaStatus::Completed);
    assert_eq!(result.context().input(), &json!({"sku": "widget"}));
    let record = orchestrator
        .run_status("order-1")
        .await?
        .expect("run recorded");
    assert_eq!(record.attempts(), 2);
    Ok(())
}
