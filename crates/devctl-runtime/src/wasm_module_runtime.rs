//! Wasmtime-backed loader for in-process custom command handlers.
//!
//! Handlers are core WebAssembly modules, either binary (`.wasm`) or text
//! (`.wat`, compiled by the transform stage). Loading runs an ordered list of
//! strategies: a standalone instantiation with no host imports, then a
//! host-linked async instantiation that provides the `devctl` import
//! namespace. Only a module that declares host imports falls through; any
//! other failure ends the load.
//!
//! Handler ABI: the module exports `memory`, an allocator
//! `devctl_alloc(len) -> ptr`, and an entry function `(ptr, len) -> status`
//! that receives the JSON payload. Status `0` means success.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use wasmparser::{Encoding, Parser, Payload};
use wasmtime::{
    Caller, Config, Engine, Extern, Func, Instance, Linker, Memory, Module, Store, TypedFunc,
};

use crate::module_source_transform::{default_module_source_transforms, ModuleSourceTransform};

/// File extensions loaded in-process rather than run as processes.
pub(crate) const MODULE_HANDLER_EXTENSIONS: &[&str] = &["wasm", "wat"];
pub(crate) const HANDLER_DEFAULT_EXPORT_NAME: &str = "default";
pub(crate) const HANDLER_MEMORY_EXPORT_NAME: &str = "memory";
pub(crate) const HANDLER_ALLOC_EXPORT_NAME: &str = "devctl_alloc";
/// Import namespace served by [`HostLinkedInstantiation`].
pub(crate) const HANDLER_HOST_MODULE_NAME: &str = "devctl";

pub fn is_module_handler_path(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            MODULE_HANDLER_EXTENSIONS
                .iter()
                .any(|known| extension.eq_ignore_ascii_case(known))
        })
}

#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("failed to read module handler {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile {} with the {transform} transform: {message}", .path.display())]
    Transform {
        path: PathBuf,
        transform: &'static str,
        message: String,
    },
    #[error("{} is not a WebAssembly module: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("{} is a WebAssembly component; command handlers must be core modules", .path.display())]
    ComponentUnsupported { path: PathBuf },
    #[error("failed to compile WebAssembly module {}: {message}", .path.display())]
    Compile { path: PathBuf, message: String },
    #[error("{} requires host imports ({})", .path.display(), .imports.join(", "))]
    HostImportsRequired { path: PathBuf, imports: Vec<String> },
    #[error("failed to instantiate {}: {message}", .path.display())]
    Instantiate { path: PathBuf, message: String },
    #[error("{reason}")]
    InvalidExport { path: PathBuf, reason: String },
}

impl ModuleLoadError {
    /// True when the next load strategy should be attempted.
    pub fn permits_fallback(&self) -> bool {
        matches!(self, Self::HostImportsRequired { .. })
    }
}

#[derive(Debug, Error)]
pub enum ModuleInvokeError {
    #[error("payload of {len} bytes exceeds the wasm32 address space")]
    PayloadTooLarge { len: usize },
    #[error("'devctl_alloc' failed while reserving the payload buffer: {message}")]
    Alloc { message: String },
    #[error("payload buffer at {ptr} (+{len} bytes) falls outside module memory")]
    PayloadOutOfBounds { ptr: i32, len: usize },
    #[error("handler export '{export}' trapped: {message}")]
    Trap { export: String, message: String },
}

/// Source bytes ready for instantiation.
#[derive(Debug, Clone)]
pub(crate) struct ModuleArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub command: String,
}

#[derive(Debug)]
struct HandlerHostState {
    command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationMode {
    Sync,
    Async,
}

/// An instantiated module whose handler export has not been selected yet.
pub(crate) struct LoadedModule {
    path: PathBuf,
    store: Store<HandlerHostState>,
    instance: Instance,
    invocation: InvocationMode,
    strategy: &'static str,
}

/// One way of turning module bytes into a live instance.
#[async_trait]
pub(crate) trait ModuleLoadStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self, artifact: &ModuleArtifact) -> Result<LoadedModule, ModuleLoadError>;
}

/// Synchronous instantiation without any host imports.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StandaloneInstantiation;

#[async_trait]
impl ModuleLoadStrategy for StandaloneInstantiation {
    fn name(&self) -> &'static str {
        "standalone"
    }

    async fn load(&self, artifact: &ModuleArtifact) -> Result<LoadedModule, ModuleLoadError> {
        let engine = Engine::default();
        let module = compile_module(&engine, artifact)?;
        let imports = declared_imports(&module);
        if !imports.is_empty() {
            return Err(ModuleLoadError::HostImportsRequired {
                path: artifact.path.clone(),
                imports,
            });
        }

        let mut store = Store::new(
            &engine,
            HandlerHostState {
                command: artifact.command.clone(),
            },
        );
        let instance = Instance::new(&mut store, &module, &[]).map_err(|error| {
            ModuleLoadError::Instantiate {
                path: artifact.path.clone(),
                message: format!("{error:#}"),
            }
        })?;
        Ok(LoadedModule {
            path: artifact.path.clone(),
            store,
            instance,
            invocation: InvocationMode::Sync,
            strategy: self.name(),
        })
    }
}

/// Async instantiation through a linker that serves the `devctl` namespace.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HostLinkedInstantiation;

#[async_trait]
impl ModuleLoadStrategy for HostLinkedInstantiation {
    fn name(&self) -> &'static str {
        "host-linked"
    }

    async fn load(&self, artifact: &ModuleArtifact) -> Result<LoadedModule, ModuleLoadError> {
        let engine = {
            let mut config = Config::new();
            config.async_support(true);
            Engine::new(&config).map_err(|error| ModuleLoadError::Compile {
                path: artifact.path.clone(),
                message: format!("failed to initialize async engine: {error:#}"),
            })?
        };
        let module = compile_module(&engine, artifact)?;

        let mut linker = Linker::new(&engine);
        register_host_functions(&mut linker).map_err(|error| ModuleLoadError::Instantiate {
            path: artifact.path.clone(),
            message: format!("failed to register host functions: {error:#}"),
        })?;
        let mut store = Store::new(
            &engine,
            HandlerHostState {
                command: artifact.command.clone(),
            },
        );
        let instance = linker
            .instantiate_async(&mut store, &module)
            .await
            .map_err(|error| ModuleLoadError::Instantiate {
                path: artifact.path.clone(),
                message: format!("{error:#}"),
            })?;
        Ok(LoadedModule {
            path: artifact.path.clone(),
            store,
            instance,
            invocation: InvocationMode::Async,
            strategy: self.name(),
        })
    }
}

fn compile_module(engine: &Engine, artifact: &ModuleArtifact) -> Result<Module, ModuleLoadError> {
    Module::new(engine, &artifact.bytes).map_err(|error| ModuleLoadError::Compile {
        path: artifact.path.clone(),
        message: format!("{error:#}"),
    })
}

fn declared_imports(module: &Module) -> Vec<String> {
    module
        .imports()
        .map(|import| format!("{}::{}", import.module(), import.name()))
        .collect()
}

fn register_host_functions(linker: &mut Linker<HandlerHostState>) -> wasmtime::Result<()> {
    linker.func_wrap(
        HANDLER_HOST_MODULE_NAME,
        "print",
        |mut caller: Caller<'_, HandlerHostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
            let bytes = read_guest_bytes(&mut caller, ptr, len)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
            Ok(())
        },
    )?;
    linker.func_wrap(
        HANDLER_HOST_MODULE_NAME,
        "eprint",
        |mut caller: Caller<'_, HandlerHostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
            let bytes = read_guest_bytes(&mut caller, ptr, len)?;
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(&bytes)?;
            stderr.flush()?;
            Ok(())
        },
    )?;
    Ok(())
}

fn read_guest_bytes(
    caller: &mut Caller<'_, HandlerHostState>,
    ptr: i32,
    len: i32,
) -> wasmtime::Result<Vec<u8>> {
    let memory = caller
        .get_export(HANDLER_MEMORY_EXPORT_NAME)
        .and_then(Extern::into_memory)
        .ok_or_else(|| {
            wasmtime::Error::msg(format!(
                "handler for '{}' does not export '{}'",
                caller.data().command,
                HANDLER_MEMORY_EXPORT_NAME
            ))
        })?;
    let offset = usize::try_from(ptr)?;
    let len = usize::try_from(len)?;
    let end = offset
        .checked_add(len)
        .ok_or_else(|| wasmtime::Error::msg("guest buffer range overflows"))?;
    memory
        .data(&caller)
        .get(offset..end)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| {
            wasmtime::Error::msg(format!(
                "guest buffer {offset}..{end} is outside module memory"
            ))
        })
}

fn select_handler_export<T>(functions: &[(String, T)]) -> Option<&(String, T)> {
    if let Some(default) = functions
        .iter()
        .find(|(name, _)| name == HANDLER_DEFAULT_EXPORT_NAME)
    {
        return Some(default);
    }
    let mut candidates = functions
        .iter()
        .filter(|(name, _)| name != HANDLER_ALLOC_EXPORT_NAME);
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Picks the invocable entry point of a loaded module.
///
/// A function exported as `default` wins; otherwise the module's only
/// exported function (ignoring the allocator) is used as the handler.
pub(crate) fn normalize_handler_export(
    loaded: LoadedModule,
) -> Result<CustomCommandHandler, ModuleLoadError> {
    let LoadedModule {
        path,
        mut store,
        instance,
        invocation,
        strategy,
    } = loaded;
    let invalid = |reason: String| ModuleLoadError::InvalidExport {
        path: path.clone(),
        reason,
    };

    let functions: Vec<(String, Func)> = instance
        .exports(&mut store)
        .filter_map(|export| {
            let name = export.name().to_string();
            export.into_func().map(|func| (name, func))
        })
        .collect();
    let (export_name, func) = select_handler_export(&functions)
        .cloned()
        .ok_or_else(|| {
            invalid(format!(
                "expected a '{HANDLER_DEFAULT_EXPORT_NAME}' export or exactly one exported function"
            ))
        })?;
    let entry = func
        .typed::<(i32, i32), i32>(&store)
        .map_err(|error| {
            invalid(format!(
                "export '{export_name}' must have signature (i32, i32) -> i32: {error}"
            ))
        })?;
    let memory = instance
        .get_memory(&mut store, HANDLER_MEMORY_EXPORT_NAME)
        .ok_or_else(|| invalid(format!("missing '{HANDLER_MEMORY_EXPORT_NAME}' export")))?;
    let alloc = instance
        .get_typed_func::<i32, i32>(&mut store, HANDLER_ALLOC_EXPORT_NAME)
        .map_err(|error| {
            invalid(format!(
                "missing '{HANDLER_ALLOC_EXPORT_NAME}: (i32) -> i32' export: {error}"
            ))
        })?;

    Ok(CustomCommandHandler {
        store,
        memory,
        alloc,
        entry,
        export_name,
        invocation,
        strategy,
    })
}

/// A module handler ready to receive its payload exactly once.
pub struct CustomCommandHandler {
    store: Store<HandlerHostState>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    entry: TypedFunc<(i32, i32), i32>,
    export_name: String,
    invocation: InvocationMode,
    strategy: &'static str,
}

impl CustomCommandHandler {
    pub fn export_name(&self) -> &str {
        &self.export_name
    }

    /// Name of the load strategy that produced this handler.
    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    /// Copies `payload_json` into module memory and runs the entry export.
    pub async fn invoke(mut self, payload_json: &str) -> Result<i32, ModuleInvokeError> {
        let bytes = payload_json.as_bytes();
        let len = i32::try_from(bytes.len())
            .map_err(|_| ModuleInvokeError::PayloadTooLarge { len: bytes.len() })?;

        let ptr = match self.invocation {
            InvocationMode::Sync => self.alloc.call(&mut self.store, len),
            InvocationMode::Async => self.alloc.call_async(&mut self.store, len).await,
        }
        .map_err(|error| ModuleInvokeError::Alloc {
            message: format!("{error:#}"),
        })?;
        let out_of_bounds = || ModuleInvokeError::PayloadOutOfBounds {
            ptr,
            len: bytes.len(),
        };
        let offset = usize::try_from(ptr).map_err(|_| out_of_bounds())?;
        self.memory
            .write(&mut self.store, offset, bytes)
            .map_err(|_| out_of_bounds())?;

        tracing::debug!(
            command = %self.store.data().command,
            export = %self.export_name,
            strategy = self.strategy,
            payload_bytes = bytes.len(),
            "invoking module handler"
        );
        match self.invocation {
            InvocationMode::Sync => self.entry.call(&mut self.store, (ptr, len)),
            InvocationMode::Async => self.entry.call_async(&mut self.store, (ptr, len)).await,
        }
        .map_err(|error| ModuleInvokeError::Trap {
            export: self.export_name.clone(),
            message: format!("{error:#}"),
        })
    }
}

/// Loads module handlers: transform, artifact check, strategies, export selection.
pub struct WasmModuleLoader {
    transforms: Vec<Box<dyn ModuleSourceTransform>>,
    strategies: Vec<Box<dyn ModuleLoadStrategy>>,
}

impl Default for WasmModuleLoader {
    fn default() -> Self {
        Self::new(
            default_module_source_transforms(),
            vec![
                Box::new(StandaloneInstantiation),
                Box::new(HostLinkedInstantiation),
            ],
        )
    }
}

impl WasmModuleLoader {
    pub(crate) fn new(
        transforms: Vec<Box<dyn ModuleSourceTransform>>,
        strategies: Vec<Box<dyn ModuleLoadStrategy>>,
    ) -> Self {
        Self {
            transforms,
            strategies,
        }
    }

    pub async fn load(
        &self,
        path: &Path,
        command: &str,
    ) -> Result<CustomCommandHandler, ModuleLoadError> {
        let artifact = self.prepare_artifact(path, command)?;
        let loaded = self.instantiate(&artifact).await?;
        normalize_handler_export(loaded)
    }

    fn prepare_artifact(&self, path: &Path, command: &str) -> Result<ModuleArtifact, ModuleLoadError> {
        let source = std::fs::read(path).map_err(|source| ModuleLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let bytes = match self.transforms.iter().find(|transform| transform.handles(path)) {
            Some(transform) => {
                tracing::debug!(
                    path = %path.display(),
                    transform = transform.name(),
                    "transforming module handler source"
                );
                transform
                    .transform(path, &source)
                    .map_err(|error| ModuleLoadError::Transform {
                        path: path.to_path_buf(),
                        transform: transform.name(),
                        message: format!("{error:#}"),
                    })?
            }
            None => source,
        };
        ensure_core_module(path, &bytes)?;
        Ok(ModuleArtifact {
            path: path.to_path_buf(),
            bytes,
            command: command.to_string(),
        })
    }

    async fn instantiate(&self, artifact: &ModuleArtifact) -> Result<LoadedModule, ModuleLoadError> {
        let mut last_error = None;
        for strategy in &self.strategies {
            match strategy.load(artifact).await {
                Ok(loaded) => {
                    tracing::debug!(
                        path = %artifact.path.display(),
                        strategy = strategy.name(),
                        "module handler loaded"
                    );
                    return Ok(loaded);
                }
                Err(error) if error.permits_fallback() => {
                    tracing::debug!(
                        path = %artifact.path.display(),
                        strategy = strategy.name(),
                        %error,
                        "load strategy declined module; trying next"
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error.unwrap_or_else(|| ModuleLoadError::Instantiate {
            path: artifact.path.clone(),
            message: "no module load strategies are configured".to_string(),
        }))
    }
}

fn ensure_core_module(path: &Path, bytes: &[u8]) -> Result<(), ModuleLoadError> {
    let parse_error = |message: String| ModuleLoadError::Parse {
        path: path.to_path_buf(),
        message,
    };
    match Parser::new(0).parse_all(bytes).next() {
        Some(Ok(Payload::Version {
            encoding: Encoding::Component,
            ..
        })) => Err(ModuleLoadError::ComponentUnsupported {
            path: path.to_path_buf(),
        }),
        Some(Ok(_)) => Ok(()),
        Some(Err(error)) => Err(parse_error(error.to_string())),
        None => Err(parse_error("module is empty".to_string())),
    }
}
