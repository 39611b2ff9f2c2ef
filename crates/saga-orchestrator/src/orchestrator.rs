use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use saga_engine::{Saga, SagaResult, SagaStatus};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::record::RunRecord;
use crate::store::{InMemoryRunStore, RunStore};

/// Registry of named sagas plus run bookkeeping keyed by correlation id.
///
/// Sagas are registered once at startup. Every execution runs a clone of the
/// registered [`Saga`], so runs never share per-run state. Step and
/// compensation failures are reported through the returned [`SagaResult`]
/// and the stored [`RunRecord`]; only misuse and store failures are errors.
pub struct SagaOrchestrator {
    sagas: IndexMap<String, Saga>,
    store: Arc<dyn RunStore>,
    config: OrchestratorConfig,
    in_flight: Mutex<HashSet<String>>,
}

impl SagaOrchestrator {
    /// Create an orchestrator recording runs in `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self::with_store(store, OrchestratorConfig::default())
    }

    /// Create an orchestrator with an unbounded in-memory run store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    /// Create an orchestrator with an in-memory run store bounded as configured.
    #[must_use]
    pub fn with_config(config: OrchestratorConfig) -> Self {
        let mut store = InMemoryRunStore::new();
        if let Some(max) = config.max_tracked_runs() {
            store = store.with_max_tracked_runs(max);
        }
        Self::with_store(Arc::new(store), config)
    }

    /// Create an orchestrator recording runs in `store` with `config` applied.
    #[must_use]
    pub fn with_store(store: Arc<dyn RunStore>, config: OrchestratorConfig) -> Self {
        Self {
            sagas: IndexMap::new(),
            store,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Register `saga` under `name`.
    ///
    /// Time bounds the saga leaves unset are filled from the configured
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::AlreadyRegistered` if `name` is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        saga: Saga,
    ) -> Result<(), OrchestratorError> {
        let name = name.into();
        if self.sagas.contains_key(&name) {
            return Err(OrchestratorError::AlreadyRegistered { name });
        }
        info!(saga = %name, steps = saga.len(), "registered saga");
        let saga = saga.with_defaults(&self.config.saga_defaults());
        self.sagas.insert(name, saga);
        Ok(())
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.sagas.contains_key(name)
    }

    /// Registered saga names in registration order.
    pub fn saga_names(&self) -> impl Iterator<Item = &str> {
        self.sagas.keys().map(String::as_str)
    }

    /// The registered saga called `name`, with configured defaults applied.
    #[must_use]
    pub fn saga(&self, name: &str) -> Option<&Saga> {
        self.sagas.get(name)
    }

    /// Execute the saga registered as `name` under a fresh correlation id.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::SagaNotFound` if no saga is registered as
    /// `name` and `OrchestratorError::Store` if the run could not be started
    /// in the store.
    pub async fn execute(
        &self,
        name: &str,
        input: Value,
    ) -> Result<SagaResult, OrchestratorError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.execute_correlated(name, correlation_id, input).await
    }

    /// Execute the saga registered as `name` under the caller's correlation id.
    ///
    /// Reusing the id of a finished or abandoned run starts a new attempt of
    /// that run. A run is abandoned when its record still reads `Running` but
    /// no execution in this orchestrator holds its correlation id, which
    /// happens when the caller drops the future mid-run.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::SagaNotFound` if no saga is registered as
    /// `name`, `OrchestratorError::RunInProgress` if a run with the same
    /// correlation id has not finished yet and `OrchestratorError::Store` if
    /// the run could not be started in the store.
    pub async fn execute_correlated(
        &self,
        name: &str,
        correlation_id: impl Into<String>,
        input: Value,
    ) -> Result<SagaResult, OrchestratorError> {
        let correlation_id = correlation_id.into();
        let saga = self.registered(name)?;
        let _claim = self.claim(&correlation_id)?;

        let attempts = match self.store.get(&correlation_id).await? {
            Some(record) => record.attempts() + 1,
            None => 1,
        };

        self.run(saga, correlation_id, input, attempts).await
    }

    /// Execute a rolled-back or abandoned run again with its original saga and
    /// input.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::RunNotFound` for an unknown correlation id,
    /// `OrchestratorError::RunInProgress` while the run is still executing,
    /// `OrchestratorError::NotRetryable` if the run completed,
    /// `OrchestratorError::SagaNotFound` if its saga is no longer
    /// registered and `OrchestratorError::Store` if the run could not be
    /// started in the store.
    pub async fn retry(&self, correlation_id: &str) -> Result<SagaResult, OrchestratorError> {
        let _claim = self.claim(correlation_id)?;

        let record = self.store.get(correlation_id).await?.ok_or_else(|| {
            OrchestratorError::RunNotFound {
                correlation_id: correlation_id.to_string(),
            }
        })?;
        // The claim is held, so a record still reading `Running` was abandoned.
        let abandoned = record.status() == SagaStatus::Running;
        if !abandoned && !record.is_retryable() {
            return Err(OrchestratorError::NotRetryable {
                correlation_id: correlation_id.to_string(),
                status: record.status(),
            });
        }

        let saga = self.registered(record.saga_name())?;
        if abandoned {
            warn!(saga = record.saga_name(), correlation_id, "retrying abandoned run");
        } else {
            info!(
                saga = record.saga_name(),
                correlation_id,
                previous_status = %record.status(),
                "retrying run"
            );
        }
        self.run(
            saga,
            correlation_id.to_string(),
            record.input().clone(),
            record.attempts() + 1,
        )
        .await
    }

    /// The stored record for `correlation_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Store` if the store could not be read.
    pub async fn run_status(
        &self,
        correlation_id: &str,
    ) -> Result<Option<RunRecord>, OrchestratorError> {
        Ok(self.store.get(correlation_id).await?)
    }

    /// Every stored record, least recently written first.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::Store` if the store could not be read.
    pub async fn runs(&self) -> Result<Vec<RunRecord>, OrchestratorError> {
        Ok(self.store.list().await?)
    }

    fn registered(&self, name: &str) -> Result<Saga, OrchestratorError> {
        self.sagas
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::SagaNotFound {
                name: name.to_string(),
            })
    }

    fn claim(&self, correlation_id: &str) -> Result<InFlight<'_>, OrchestratorError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(correlation_id.to_string()) {
            return Err(OrchestratorError::RunInProgress {
                correlation_id: correlation_id.to_string(),
            });
        }
        Ok(InFlight {
            set: &self.in_flight,
            correlation_id: correlation_id.to_string(),
        })
    }

    async fn run(
        &self,
        saga: Saga,
        correlation_id: String,
        input: Value,
        attempts: u32,
    ) -> Result<SagaResult, OrchestratorError> {
        let mut record = RunRecord::started(
            correlation_id.clone(),
            saga.name().to_string(),
            input.clone(),
            attempts,
        );
        self.store.put(record.clone()).await?;

        let result = saga.execute_correlated(input, correlation_id).await;

        record.finish(&result);
        if record.status().needs_intervention() {
            warn!(
                saga = record.saga_name(),
                correlation_id = record.correlation_id(),
                compensation_failures = ?record.compensation_failures(),
                "run needs manual intervention"
            );
        }
        // A failed terminal write leaves the record `Running`, which later
        // calls treat as abandoned.
        if let Err(err) = self.store.put(record.clone()).await {
            error!(
                saga = record.saga_name(),
                correlation_id = record.correlation_id(),
                status = %record.status(),
                error = %err,
                "failed to record finished run"
            );
        }
        Ok(result)
    }
}

impl std::fmt::Debug for SagaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaOrchestrator")
            .field("sagas", &self.sagas.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Marks a correlation id as executing until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    correlation_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.correlation_id);
    }
}
