use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;
use devctl_config::{CustomCommandEntry, ProjectConfig};
use devctl_runtime::{
    InheritedStdioProcessRunner, ModuleLoadError, ProcessInvocation, ProcessRunError,
    ProcessRunner, WasmModuleLoader,
};
use serde_json::Value;

use crate::custom_command_error::{CustomCommandError, DispatchOutcome};
use crate::custom_command_payload::{derive_handler_args, CustomCommandPayload};
use crate::custom_command_resolver::{resolve_handler, HandlerKind};

/// Interpreter for handlers that are plain, non-executable files.
pub const SCRIPT_SHELL_PROGRAM: &str = "sh";

#[derive(Debug, Clone, PartialEq)]
/// Project inputs a dispatch reads; fixed for the lifetime of one invocation.
pub struct CustomCommandContext {
    pub commands: Vec<CustomCommandEntry>,
    pub cwd: PathBuf,
    pub project: Value,
}

impl CustomCommandContext {
    pub fn from_project(project: &ProjectConfig) -> Result<Self> {
        Ok(Self {
            commands: project.commands.clone(),
            cwd: project.cwd.clone(),
            project: project.to_payload_value()?,
        })
    }

    /// Context used when no project config was found: every id is unknown.
    pub fn without_project(cwd: PathBuf) -> Self {
        Self {
            commands: Vec::new(),
            cwd,
            project: Value::Null,
        }
    }

    pub fn find_command(&self, name: &str) -> Option<&CustomCommandEntry> {
        self.commands.iter().find(|entry| entry.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationTarget {
    Process,
    Module,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchState {
    Idle,
    Resolving,
    Invoking(InvocationTarget),
    Done,
    Failed,
}

impl DispatchState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Invoking(InvocationTarget::Process) => "invoking_process",
            Self::Invoking(InvocationTarget::Module) => "invoking_module",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

struct DispatchTrace<'a> {
    command: &'a str,
    state: DispatchState,
}

impl<'a> DispatchTrace<'a> {
    fn new(command: &'a str) -> Self {
        Self {
            command,
            state: DispatchState::Idle,
        }
    }

    fn advance(&mut self, next: DispatchState) {
        debug_assert!(
            !self.state.is_terminal(),
            "dispatch already finished in state {}",
            self.state.as_str()
        );
        tracing::debug!(
            command = self.command,
            from = self.state.as_str(),
            to = next.as_str(),
            "custom command dispatch transition"
        );
        self.state = next;
    }
}

/// Maps a command id to its handler and runs it to completion.
pub struct CustomCommandDispatcher<R = InheritedStdioProcessRunner> {
    runner: R,
    loader: WasmModuleLoader,
}

impl Default for CustomCommandDispatcher {
    fn default() -> Self {
        Self::new(InheritedStdioProcessRunner, WasmModuleLoader::default())
    }
}

impl<R: ProcessRunner> CustomCommandDispatcher<R> {
    pub fn new(runner: R, loader: WasmModuleLoader) -> Self {
        Self { runner, loader }
    }

    /// Dispatches `command` with the invocation's raw `argv`.
    pub async fn dispatch(
        &self,
        context: &CustomCommandContext,
        command: &str,
        argv: &[String],
    ) -> DispatchOutcome {
        let mut trace = DispatchTrace::new(command);
        let result = self.dispatch_inner(context, command, argv, &mut trace).await;
        trace.advance(if result.is_ok() {
            DispatchState::Done
        } else {
            DispatchState::Failed
        });
        DispatchOutcome::from(result)
    }

    async fn dispatch_inner(
        &self,
        context: &CustomCommandContext,
        command: &str,
        argv: &[String],
        trace: &mut DispatchTrace<'_>,
    ) -> Result<(), CustomCommandError> {
        let entry = context
            .find_command(command)
            .filter(|_| !command.is_empty())
            .ok_or_else(|| CustomCommandError::CommandNotFound {
                command: command.to_string(),
            })?;
        let args = derive_handler_args(argv, command);

        trace.advance(DispatchState::Resolving);
        let resolved = resolve_handler(&entry.handler, &context.cwd, command)?;
        tracing::debug!(
            command,
            kind = resolved.kind.as_str(),
            path = %resolved.path.display(),
            "resolved custom command handler"
        );

        match resolved.kind {
            HandlerKind::ExternalProgram | HandlerKind::Executable => {
                trace.advance(DispatchState::Invoking(InvocationTarget::Process));
                let args = args.into_iter().map(OsString::from).collect();
                self.run_process(resolved.path, args, &context.cwd, command)
                    .await
            }
            HandlerKind::Script => {
                trace.advance(DispatchState::Invoking(InvocationTarget::Process));
                let mut shell_args = Vec::with_capacity(args.len() + 1);
                shell_args.push(resolved.path.into_os_string());
                shell_args.extend(args.into_iter().map(OsString::from));
                self.run_process(
                    PathBuf::from(SCRIPT_SHELL_PROGRAM),
                    shell_args,
                    &context.cwd,
                    command,
                )
                .await
            }
            HandlerKind::Module => {
                trace.advance(DispatchState::Invoking(InvocationTarget::Module));
                let payload = CustomCommandPayload {
                    args,
                    argv: argv.to_vec(),
                    command: command.to_string(),
                    cwd: context.cwd.clone(),
                    config: context.project.clone(),
                    project: context.project.clone(),
                };
                self.run_module(&resolved.path, &payload).await
            }
            HandlerKind::Missing => Err(CustomCommandError::HandlerNotFound {
                command: command.to_string(),
                path: resolved.path,
            }),
        }
    }

    async fn run_process(
        &self,
        program: PathBuf,
        args: Vec<OsString>,
        cwd: &Path,
        command: &str,
    ) -> Result<(), CustomCommandError> {
        let invocation = ProcessInvocation {
            program,
            args,
            cwd: cwd.to_path_buf(),
            display_name: command.to_string(),
        };
        self.runner
            .run(&invocation)
            .await
            .map_err(|error| match error {
                ProcessRunError::Spawn(source) | ProcessRunError::Wait { source, .. } => {
                    CustomCommandError::SpawnError {
                        command: command.to_string(),
                        source,
                    }
                }
                ProcessRunError::Exited { termination, .. } => {
                    CustomCommandError::ExternalProcessFailed {
                        command: command.to_string(),
                        termination,
                    }
                }
            })
    }

    async fn run_module(
        &self,
        path: &Path,
        payload: &CustomCommandPayload,
    ) -> Result<(), CustomCommandError> {
        let command = payload.command.as_str();
        let handler = self
            .loader
            .load(path, command)
            .await
            .map_err(|error| match error {
                ModuleLoadError::InvalidExport { reason, .. } => {
                    CustomCommandError::InvalidHandlerExport {
                        command: command.to_string(),
                        reason,
                    }
                }
                source => CustomCommandError::ModuleLoadFailed {
                    command: command.to_string(),
                    source,
                },
            })?;
        tracing::debug!(
            command,
            export = handler.export_name(),
            strategy = handler.strategy(),
            "module handler ready"
        );

        let handler_failed = |code: Option<i32>, detail: String| {
            CustomCommandError::HandlerFailed {
                command: command.to_string(),
                code,
                detail,
            }
        };
        let payload_json = serde_json::to_string(payload)
            .map_err(|error| handler_failed(None, format!("failed to encode payload: {error}")))?;
        let status = handler
            .invoke(&payload_json)
            .await
            .map_err(|error| handler_failed(None, error.to_string()))?;
        if status != 0 {
            return Err(handler_failed(
                Some(status),
                format!("returned status {status}"),
            ));
        }
        Ok(())
    }
}
