use saga_engine::{SagaResult, SagaStatus, StepResult};

use super::ResultFormatter;
use crate::error::Result;

pub(crate) struct PlainTextFormatter;

impl PlainTextFormatter {
    fn format_header(output: &mut String, result: &SagaResult) {
        output.push_str(&format!("Saga '{}'", result.saga_name()));
        if let Some(id) = result.correlation_id() {
            output.push_str(&format!(" (run {id})"));
        }
        output.push_str(&format!(
            ": {} in {}ms\n",
            result.status(),
            result.duration().as_millis()
        ));
    }

    fn format_step_list(output: &mut String, title: &str, steps: &[StepResult]) {
        if steps.is_empty() {
            return;
        }
        output.push_str(&format!("\n{title}:\n"));
        for step in steps {
            output.push_str(&format!(
                "  {} {} ({}ms)",
                step.status().glyph(),
                step.step_name(),
                step.duration_ms()
            ));
            if let Some(error) = step.error() {
                output.push_str(&format!(": {error}"));
            }
            output.push('\n');
        }
    }

    fn format_verdict(output: &mut String, result: &SagaResult) {
        match result.status() {
            SagaStatus::Compensated => {
                output.push_str("\nAll completed steps were compensated\n");
            }
            SagaStatus::Failed => {
                output.push_str("\nManual intervention required:\n");
                for error in result.compensation_errors() {
                    output.push_str(&format!("  {error}: {}\n", error.error));
                }
            }
            _ => {}
        }
    }
}

impl ResultFormatter for PlainTextFormatter {
    fn format(&self, result: &SagaResult) -> Result<String> {
        let mut output = String::new();
        Self::format_header(&mut output, result);
        Self::format_step_list(&mut output, "Steps", result.steps());
        Self::format_step_list(&mut output, "Compensations", result.compensations());
        Self::format_verdict(&mut output, result);
        Ok(output)
    }
}
