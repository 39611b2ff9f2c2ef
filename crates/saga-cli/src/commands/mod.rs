mod run;
mod validate;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Subcommand;
use saga_engine::SagaStatus;

use crate::error::Result;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Parse a saga definition and list its steps
    Validate {
        /// Path to the saga definition (TOML)
        file: PathBuf,
    },
    /// Execute a saga definition and report how every step ended
    Run(run::RunArgs),
}

/// How a command ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    RolledBack,
    NeedsIntervention,
}

impl Outcome {
    pub(crate) fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::RolledBack => ExitCode::from(1),
            Self::NeedsIntervention => ExitCode::from(2),
        }
    }
}

/// A run that stopped short of a terminal status is reported as needing
/// intervention.
impl From<SagaStatus> for Outcome {
    fn from(status: SagaStatus) -> Self {
        match status {
            SagaStatus::Completed => Self::Success,
            SagaStatus::Compensated => Self::RolledBack,
            SagaStatus::Failed
            | SagaStatus::Pending
            | SagaStatus::Running
            | SagaStatus::Compensating => Self::NeedsIntervention,
        }
    }
}

impl Commands {
    pub(crate) fn execute(self) -> Result<Outcome> {
        match self {
            Self::Validate { file } => validate::run(&file),
            Self::Run(args) => run::run(args),
        }
    }
}
