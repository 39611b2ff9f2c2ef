//! Saga pattern for multi-step distributed transactions.
//!
//! This crate executes a named, ordered sequence of asynchronous steps against
//! a shared [`SagaContext`]. If any step fails, every step that already
//! completed is compensated in reverse order, and the run is summarised in a
//! [`SagaResult`]. Ordinary step and compensation failures never surface as
//! errors; only programmer mistakes (such as duplicate step names) do.

mod action;
mod builder;
mod config;
mod context;
mod error;
mod result;
mod run;
mod saga;
mod step;

pub use action::{Action, FnAction, action_fn};
pub use builder::SagaBuilder;
pub use config::SagaConfig;
pub use context::{ContextSnapshot, SagaContext};
pub use error::{
    ActionError, BuilderError, CompensationError, ContextError, SagaError, StepError, StepFailure,
};
pub use result::{SagaResult, SagaStatus, StepResult};
pub use run::{SagaRun, StepState, StepStatus};
pub use saga::Saga;
pub use step::SagaStep;

pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
