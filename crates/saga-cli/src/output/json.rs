use saga_engine::SagaResult;

use super::ResultFormatter;
use crate::error::{CliError, Result};

pub(crate) struct JsonFormatter;

impl ResultFormatter for JsonFormatter {
    fn format(&self, result: &SagaResult) -> Result<String> {
        let mut rendered = serde_json::to_string_pretty(result).map_err(CliError::RenderJson)?;
        rendered.push('\n');
        Ok(rendered)
    }
}
