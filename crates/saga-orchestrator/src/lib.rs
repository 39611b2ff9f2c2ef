//! Saga registration, execution and run tracking.
//!
//! A [`SagaOrchestrator`] holds sagas registered by name at startup and
//! records every run in a [`RunStore`], keyed by correlation id, so callers
//! can look up the outcome of a run later or retry one that rolled back.

mod config;
mod error;
mod orchestrator;
mod record;
mod store;

pub use config::OrchestratorConfig;
pub use error::{ConfigError, OrchestratorError, RunStoreError};
pub use orchestrator::SagaOrchestrator;
pub use record::RunRecord;
pub use store::{InMemoryRunStore, RunStore};
