use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use saga_engine::{Action, Saga, SagaBuilder, SagaContext, SagaStep, StepError, async_trait};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{CliError, Result};

/// A saga described in TOML whose steps only simulate work.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SagaDefinition {
    name: String,
    #[serde(default, rename = "deadline-ms")]
    deadline_ms: Option<u64>,
    #[serde(default)]
    steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StepDefinition {
    name: String,
    #[serde(default)]
    writes: IndexMap<String, Value>,
    #[serde(default, rename = "delay-ms")]
    delay_ms: u64,
    #[serde(default, rename = "timeout-ms")]
    timeout_ms: Option<u64>,
    #[serde(default)]
    fail: bool,
    #[serde(default)]
    compensation: CompensationMode,
    #[serde(default, rename = "compensation-delay-ms")]
    compensation_delay_ms: u64,
    #[serde(default, rename = "compensation-timeout-ms")]
    compensation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CompensationMode {
    #[default]
    None,
    Succeed,
    Fail,
}

impl SagaDefinition {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::ReadDefinition {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CliError::ParseDefinition {
            path: path.to_path_buf(),
            source,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub(crate) fn build(&self) -> Result<Saga> {
        let mut builder = SagaBuilder::new(&self.name);
        if let Some(ms) = self.deadline_ms {
            builder = builder.deadline(Duration::from_millis(ms));
        }
        for step in &self.steps {
            builder = builder.step(step.to_step());
        }
        Ok(builder.build()?)
    }
}

impl StepDefinition {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn compensation(&self) -> CompensationMode {
        self.compensation
    }

    pub(crate) fn describe(&self) -> String {
        let mut traits = Vec::new();
        if self.fail {
            traits.push("fails".to_string());
        }
        if !self.writes.is_empty() {
            let keys: Vec<_> = self.writes.keys().map(String::as_str).collect();
            traits.push(format!("writes {}", keys.join(", ")));
        }
        if let Some(ms) = self.timeout_ms {
            traits.push(format!("timeout {ms}ms"));
        }
        traits.push(match self.compensation {
            CompensationMode::None => "no compensation".to_string(),
            CompensationMode::Succeed => "compensates".to_string(),
            CompensationMode::Fail => "compensation fails".to_string(),
        });
        traits.join(", ")
    }

    fn to_step(&self) -> SagaStep {
        let mut step = SagaStep::new(
            self.name.clone(),
            ScriptedAction {
                step: self.name.clone(),
                writes: self.writes.clone(),
                delay: Duration::from_millis(self.delay_ms),
                fail: self.fail,
            },
        );
        if let Some(ms) = self.timeout_ms {
            step = step.with_timeout(Duration::from_millis(ms));
        }
        if self.compensation != CompensationMode::None {
            step = step.with_compensation(ScriptedCompensation {
                step: self.name.clone(),
                keys: self.writes.keys().cloned().collect(),
                delay: Duration::from_millis(self.compensation_delay_ms),
                fail: self.compensation == CompensationMode::Fail,
            });
        }
        if let Some(ms) = self.compensation_timeout_ms {
            step = step.with_compensation_timeout(Duration::from_millis(ms));
        }
        step
    }
}

/// Waits, then either fails or writes its values into the context.
struct ScriptedAction {
    step: String,
    writes: IndexMap<String, Value>,
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl Action for ScriptedAction {
    async fn run(&self, ctx: &mut SagaContext) -> std::result::Result<(), StepError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(StepError::new(format!(
                "step '{}' is scripted to fail",
                self.step
            )));
        }
        for (key, value) in &self.writes {
            ctx.set(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Removes what the forward action wrote, or fails if scripted to.
struct ScriptedCompensation {
    step: String,
    keys: Vec<String>,
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl Action for ScriptedCompensation {
    async fn run(&self, ctx: &mut SagaContext) -> std::result::Result<(), StepError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(StepError::new(format!(
                "compensation of '{}' is scripted to fail",
                self.step
            )));
        }
        for key in &self.keys {
            ctx.remove(key);
        }
        Ok(())
    }
}
