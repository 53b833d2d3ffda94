//! Execution runtimes behind devctl custom commands.
//!
//! Provides the wasmtime-backed in-process module loader (with its source
//! transform stage and ordered load strategies) and the inherited-stdio
//! process runner used for scripts and executables.

mod module_source_transform;
pub mod process_runtime;
pub mod wasm_module_runtime;

pub use process_runtime::{
    InheritedStdioProcessRunner, ProcessInvocation, ProcessRunError, ProcessRunner,
    ProcessTermination,
};
pub use wasm_module_runtime::{
    is_module_handler_path, CustomCommandHandler, ModuleInvokeError, ModuleLoadError,
    WasmModuleLoader,
};
