//! Resolution and dispatch of project-declared custom commands.
//!
//! Maps an unrecognized CLI command id to its configured handler, classifies
//! the handler against the filesystem, and runs it as a process or an
//! in-process WebAssembly module, converging on a single exit status.

pub mod custom_command_dispatch;
pub mod custom_command_error;
pub mod custom_command_payload;
pub mod custom_command_resolver;

pub use custom_command_dispatch::{
    CustomCommandContext, CustomCommandDispatcher, SCRIPT_SHELL_PROGRAM,
};
pub use custom_command_error::{CustomCommandError, DispatchOutcome};
pub use custom_command_payload::{derive_handler_args, CustomCommandPayload};
pub use custom_command_resolver::{
    classify_handler, resolve_handler, HandlerKind, ResolvedHandler, HANDLER_INDEX_CANDIDATES,
};
