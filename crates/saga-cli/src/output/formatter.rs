use saga_engine::SagaResult;

use crate::error::Result;

pub(crate) trait ResultFormatter {
    fn format(&self, result: &SagaResult) -> Result<String>;
}
