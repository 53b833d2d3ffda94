use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One external program launch for a custom command.
pub struct ProcessInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a non-successful child process ended.
pub enum ProcessTermination {
    Code(i32),
    Signal(i32),
    Unknown,
}

impl ProcessTermination {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }
        Self::Unknown
    }

    /// The child's own code, or `1` when it ended without one.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Code(code) => *code,
            Self::Signal(_) | Self::Unknown => 1,
        }
    }
}

impl fmt::Display for ProcessTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exited with code {code}"),
            Self::Signal(signal) => write!(f, "was terminated by signal {signal}"),
            Self::Unknown => write!(f, "exited with code unknown"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessRunError {
    /// Platform error from launching the program, passed through untouched.
    #[error(transparent)]
    Spawn(std::io::Error),
    #[error("failed while waiting for custom command \"{display_name}\": {source}")]
    Wait {
        display_name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Custom command \"{display_name}\" {termination}")]
    Exited {
        display_name: String,
        termination: ProcessTermination,
    },
}

/// Launches a program and resolves once it has exited.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &ProcessInvocation) -> Result<(), ProcessRunError>;
}

/// Runs children attached to the parent's terminal so interactive tools work.
#[derive(Debug, Clone, Copy, Default)]
pub struct InheritedStdioProcessRunner;

#[async_trait]
impl ProcessRunner for InheritedStdioProcessRunner {
    async fn run(&self, invocation: &ProcessInvocation) -> Result<(), ProcessRunError> {
        tracing::debug!(
            command = %invocation.display_name,
            program = %invocation.program.display(),
            args = ?invocation.args,
            cwd = %invocation.cwd.display(),
            "spawning custom command process"
        );
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ProcessRunError::Spawn)?;

        let status = child.wait().await.map_err(|source| ProcessRunError::Wait {
            display_name: invocation.display_name.clone(),
            source,
        })?;
        if status.success() {
            return Ok(());
        }

        let termination = ProcessTermination::from_status(status);
        tracing::debug!(
            command = %invocation.display_name,
            %termination,
            "custom command process failed"
        );
        Err(ProcessRunError::Exited {
            display_name: invocation.display_name.clone(),
            termination,
        })
    }
}
