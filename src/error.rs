use crate::{grouping, runner, synthesize};

/// Exit code for a run that found type errors.
pub const EXIT_TYPE_ERRORS: i32 = 1;
/// Exit code for configuration errors (no governing tsconfig, unparseable
/// configuration, invalid extends target).
pub const EXIT_CONFIG_ERROR: i32 = 2;
/// Exit code for system errors (spawn failures, temp-file creation).
pub const EXIT_SYSTEM_ERROR: i32 = 3;

/// Top-level error surface for the CLI, one variant per error taxonomy so
/// each maps to a distinct exit code.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Group(#[from] grouping::GroupError),

    #[error("unable to determine working directory")]
    WorkingDirectory(#[source] std::io::Error),

    #[error(transparent)]
    Synthesize(#[from] synthesize::SynthesizeError),

    #[error(transparent)]
    Run(#[from] runner::RunError),
}

impl CheckError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CheckError::Group(_) => EXIT_CONFIG_ERROR,
            CheckError::WorkingDirectory(_)
            | CheckError::Synthesize(_)
            | CheckError::Run(_) => EXIT_SYSTEM_ERROR,
        }
    }
}
