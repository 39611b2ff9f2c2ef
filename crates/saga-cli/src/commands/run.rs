use std::path::PathBuf;

use clap::Args;
use saga_orchestrator::{OrchestratorConfig, SagaOrchestrator};
use serde_json::Value;
use tracing::debug;

use super::Outcome;
use crate::definition::SagaDefinition;
use crate::error::{CliError, Result};
use crate::output::{JsonFormatter, PlainTextFormatter, ResultFormatter};

#[derive(Args)]
pub(crate) struct RunArgs {
    /// Path to the saga definition (TOML)
    file: PathBuf,

    /// Initial saga input as a JSON document
    #[arg(long, default_value = "{}")]
    input: String,

    /// Correlation id for the run (default: a generated UUID)
    #[arg(long)]
    correlation_id: Option<String>,

    /// Orchestrator configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

pub(crate) fn run(args: RunArgs) -> Result<Outcome> {
    let definition = SagaDefinition::load(&args.file)?;
    let saga = definition.build()?;
    let input: Value = serde_json::from_str(&args.input).map_err(CliError::InvalidInput)?;
    let config = match &args.config {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default(),
    };
    debug!(?config, "loaded orchestrator configuration");

    let mut orchestrator = SagaOrchestrator::with_config(config);
    let name = saga.name().to_string();
    orchestrator.register(name.clone(), saga)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(CliError::Runtime)?;
    let result = runtime.block_on(async {
        match args.correlation_id {
            Some(id) => orchestrator.execute_correlated(&name, id, input).await,
            None => orchestrator.execute(&name, input).await,
        }
    })?;

    let formatter: &dyn ResultFormatter = if args.json {
        &JsonFormatter
    } else {
        &PlainTextFormatter
    };
    print!("{}", formatter.format(&result)?);

    Ok(Outcome::from(result.status()))
}
