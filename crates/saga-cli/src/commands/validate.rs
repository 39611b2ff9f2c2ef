use std::path::Path;

use super::Outcome;
use crate::definition::SagaDefinition;
use crate::error::Result;

pub(crate) fn run(file: &Path) -> Result<Outcome> {
    let definition = SagaDefinition::load(file)?;
    let saga = definition.build()?;

    println!("Saga '{}' is valid ({} step(s))", saga.name(), saga.len());
    for (index, step) in definition.steps().iter().enumerate() {
        println!("  {}. {} [{}]", index + 1, step.name(), step.describe());
    }

    Ok(Outcome::Success)
}
