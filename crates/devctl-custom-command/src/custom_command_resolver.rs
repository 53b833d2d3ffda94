use std::path::{Path, PathBuf};

use devctl_runtime::is_module_handler_path;

use crate::custom_command_error::CustomCommandError;

/// Index files probed when a handler points at a directory, in priority order.
pub const HANDLER_INDEX_CANDIDATES: &[&str] = &["index.wasm", "index.wat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Execution strategy selected for a handler.
pub enum HandlerKind {
    Missing,
    /// Bare program name looked up on `PATH` at spawn time.
    ExternalProgram,
    Executable,
    Module,
    /// Non-executable file run through `sh`.
    Script,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::ExternalProgram => "external_program",
            Self::Executable => "executable",
            Self::Module => "module",
            Self::Script => "script",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHandler {
    pub path: PathBuf,
    pub exists: bool,
    pub kind: HandlerKind,
}

/// Classifies `handler_spec` against the filesystem without failing on absence.
///
/// A handler that names nothing on disk is an [`HandlerKind::ExternalProgram`]
/// when it is a bare name, otherwise [`HandlerKind::Missing`]. Directories
/// resolve to their first existing index candidate. Files with the execute
/// bit are always executables, whatever their extension.
pub fn classify_handler(
    handler_spec: &str,
    cwd: &Path,
    command: &str,
) -> Result<ResolvedHandler, CustomCommandError> {
    let spec_path = Path::new(handler_spec);
    let resolved = if spec_path.is_absolute() {
        spec_path.to_path_buf()
    } else {
        cwd.join(spec_path)
    };

    let Ok(metadata) = std::fs::metadata(&resolved) else {
        if is_bare_program_name(handler_spec) {
            return Ok(ResolvedHandler {
                path: PathBuf::from(handler_spec),
                exists: false,
                kind: HandlerKind::ExternalProgram,
            });
        }
        return Ok(ResolvedHandler {
            path: resolved,
            exists: false,
            kind: HandlerKind::Missing,
        });
    };

    if metadata.is_dir() {
        let index = HANDLER_INDEX_CANDIDATES
            .iter()
            .map(|candidate| resolved.join(candidate))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| CustomCommandError::MissingIndexFile {
                command: command.to_string(),
                path: resolved.clone(),
            })?;
        return Ok(classify_existing_file(index));
    }

    Ok(classify_existing_file(resolved))
}

/// Like [`classify_handler`], but a missing handler is an error.
pub fn resolve_handler(
    handler_spec: &str,
    cwd: &Path,
    command: &str,
) -> Result<ResolvedHandler, CustomCommandError> {
    let resolved = classify_handler(handler_spec, cwd, command)?;
    if resolved.kind == HandlerKind::Missing {
        return Err(CustomCommandError::HandlerNotFound {
            command: command.to_string(),
            path: resolved.path,
        });
    }
    Ok(resolved)
}

fn classify_existing_file(path: PathBuf) -> ResolvedHandler {
    let kind = if is_executable_by_current_user(&path) {
        HandlerKind::Executable
    } else if is_module_handler_path(&path) {
        HandlerKind::Module
    } else {
        HandlerKind::Script
    };
    ResolvedHandler {
        path,
        exists: true,
        kind,
    }
}

fn is_bare_program_name(handler_spec: &str) -> bool {
    !handler_spec.is_empty()
        && !handler_spec.starts_with('.')
        && !handler_spec.chars().any(std::path::is_separator)
}

#[cfg(unix)]
fn is_executable_by_current_user(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    access(path, AccessFlags::X_OK).is_ok()
}

#[cfg(not(unix))]
fn is_executable_by_current_user(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            ["exe", "com", "bat", "cmd"]
                .iter()
                .any(|known| extension.eq_ignore_ascii_case(known))
        })
}
