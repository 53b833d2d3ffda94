use std::path::PathBuf;

use devctl_runtime::{ModuleLoadError, ProcessTermination};
use thiserror::Error;

#[derive(Debug, Error)]
/// Failures that end a custom command dispatch. None are retried.
pub enum CustomCommandError {
    #[error("command {command} not found")]
    CommandNotFound { command: String },
    #[error("Custom command \"{command}\" handler not found at {}", .path.display())]
    HandlerNotFound { command: String, path: PathBuf },
    #[error(
        "Custom command \"{command}\" handler directory missing index file ({})",
        .path.display()
    )]
    MissingIndexFile { command: String, path: PathBuf },
    #[error("Custom command \"{command}\" handler failed to load: {source}")]
    ModuleLoadFailed {
        command: String,
        #[source]
        source: ModuleLoadError,
    },
    #[error("Custom command \"{command}\" handler must export a function: {reason}")]
    InvalidHandlerExport { command: String, reason: String },
    #[error("Custom command \"{command}\" handler failed: {detail}")]
    HandlerFailed {
        command: String,
        code: Option<i32>,
        detail: String,
    },
    #[error("Custom command \"{command}\" {termination}")]
    ExternalProcessFailed {
        command: String,
        termination: ProcessTermination,
    },
    /// The OS error is the whole message.
    #[error("{source}")]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

// Exit statuses keep only the low byte.
const MAX_EXIT_CODE: i32 = 255;

impl CustomCommandError {
    /// Exit status for the CLI: the handler's own code when it is a valid
    /// failure status, else 1.
    pub fn exit_code(&self) -> i32 {
        let code = match self {
            Self::ExternalProcessFailed { termination, .. } => Some(termination.exit_code()),
            Self::HandlerFailed { code, .. } => *code,
            _ => None,
        };
        code.filter(|code| (1..=MAX_EXIT_CODE).contains(code))
            .unwrap_or(1)
    }
}

#[derive(Debug)]
/// Terminal result of one dispatch.
pub enum DispatchOutcome {
    Done,
    Failed(CustomCommandError),
}

impl DispatchOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Done => 0,
            Self::Failed(error) => error.exit_code(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl From<Result<(), CustomCommandError>> for DispatchOutcome {
    fn from(result: Result<(), CustomCommandError>) -> Self {
        match result {
            Ok(()) => Self::Done,
            Err(error) => Self::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CustomCommandError, DispatchOutcome};
    use devctl_runtime::ProcessTermination;

    #[test]
    fn unit_exit_code_mirrors_child_code_and_defaults_to_one() {
        let exited = CustomCommandError::ExternalProcessFailed {
            command: "lint".to_string(),
            termination: ProcessTermination::Code(7),
        };
        assert_eq!(exited.exit_code(), 7);

        let signalled = CustomCommandError::ExternalProcessFailed {
            command: "lint".to_string(),
            termination: ProcessTermination::Signal(15),
        };
        assert_eq!(signalled.exit_code(), 1);

        let missing = CustomCommandError::CommandNotFound {
            command: "nope".to_string(),
        };
        assert_eq!(missing.exit_code(), 1);
        assert_eq!(DispatchOutcome::Done.exit_code(), 0);
    }

    #[test]
    fn unit_command_not_found_message_differs_from_handler_not_found() {
        let not_found = CustomCommandError::CommandNotFound {
            command: "deploy".to_string(),
        };
        let handler_missing = CustomCommandError::HandlerNotFound {
            command: "deploy".to_string(),
            path: "/repo/scripts/deploy.sh".into(),
        };
        assert_eq!(not_found.to_string(), "command deploy not found");
        assert_eq!(
            handler_missing.to_string(),
            "Custom command \"deploy\" handler not found at /repo/scripts/deploy.sh"
        );
    }

    #[test]
    fn regression_spawn_error_message_is_the_os_error() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let expected = source.to_string();
        let error = CustomCommandError::SpawnError {
            command: "lint".to_string(),
            source,
        };
        assert_eq!(error.to_string(), expected);
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn regression_handler_status_outside_exit_range_maps_to_one() {
        let handler_failed = |code: Option<i32>| CustomCommandError::HandlerFailed {
            command: "bump".to_string(),
            code,
            detail: "returned status".to_string(),
        };
        assert_eq!(handler_failed(Some(3)).exit_code(), 3);
        assert_eq!(handler_failed(Some(255)).exit_code(), 255);
        assert_eq!(handler_failed(Some(256)).exit_code(), 1);
        assert_eq!(handler_failed(Some(512)).exit_code(), 1);
        assert_eq!(handler_failed(Some(-1)).exit_code(), 1);
        assert_eq!(handler_failed(None).exit_code(), 1);
    }
}
