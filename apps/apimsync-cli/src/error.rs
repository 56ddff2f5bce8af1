//! CLI error type and exit codes

use thiserror::Error;

use apimsync_core::error::CoreError;
use apimsync_engine::EngineError;

/// Exit codes:
/// - 0: success
/// - 1: general error
/// - 3: network error
/// - 4: input/validation error
/// - 5: service error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CliError {
    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation(_) => 4,
            CliError::Core(_) => 4,
            CliError::Engine(engine) => match engine {
                EngineError::Network { .. } => 3,
                EngineError::Api { status, .. } if *status >= 500 => 5,
                EngineError::Api { .. } => 4,
                EngineError::Core(_) => 4,
                EngineError::RelationshipValidation { .. } => 4,
                EngineError::Git { .. } => 4,
                EngineError::Cancelled => 1,
                _ => 1,
            },
        }
    }

    /// Print the error to stderr with appropriate formatting.
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();
        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }
    }
}
