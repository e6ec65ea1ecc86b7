use crate::builtin::BuiltinError;
use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Exit code reported when a command cannot be resolved.
pub const NOT_FOUND_EXIT_CODE: i32 = 127;
/// Exit code reported when a resolved command cannot be started.
pub const NOT_EXECUTABLE_EXIT_CODE: i32 = 126;

/// Failure of one interpretation cycle.
///
/// Every variant that comes from a pipeline stage names that stage's command.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// `=VALUE`. Rejected on purpose rather than silently ignored.
    #[error("invalid assignment '{line}': variable name is empty")]
    InvalidAssignment { line: String },

    #[error("{command}: {source}")]
    Builtin {
        command: String,
        #[source]
        source: BuiltinError,
    },

    #[error("error starting command '{command}': command not found")]
    CommandNotFound { command: String },

    #[error("error starting command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("error creating pipe for command '{command}'")]
    Pipe { command: String },

    #[error("error executing command '{command}': {status}")]
    Exit { command: String, status: ExitStatus },

    #[error("error executing command '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("error forwarding output of command '{command}': {source}")]
    Output {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl ExecutionError {
    /// Name of the stage that failed, if the failure came from a stage.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::InvalidAssignment { .. } => None,
            Self::Builtin { command, .. }
            | Self::CommandNotFound { command }
            | Self::Spawn { command, .. }
            | Self::Pipe { command }
            | Self::Exit { command, .. }
            | Self::Wait { command, .. }
            | Self::Output { command, .. } => Some(command),
        }
    }

    /// Conventional shell exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandNotFound { .. } => NOT_FOUND_EXIT_CODE,
            Self::Spawn { .. } => NOT_EXECUTABLE_EXIT_CODE,
            Self::Exit { status, .. } => match status.code() {
                Some(code) => code,
                None => crate::external::terminated_by_signal(*status),
            },
            _ => 1,
        }
    }
}
