//! Source transform stage applied to module handlers before loading.
//!
//! A transform claims handler files by extension and turns their contents
//! into a binary WebAssembly module. The loader consults transforms only
//! for files they claim, so an inline compiler can later be swapped for an
//! external toolchain without touching resolution or dispatch.

use std::path::Path;

use anyhow::Result;

/// Converts a claimed handler source into loadable module bytes.
pub(crate) trait ModuleSourceTransform: Send + Sync {
    /// Short label used in diagnostics.
    fn name(&self) -> &'static str;

    fn handles(&self, path: &Path) -> bool;

    fn transform(&self, path: &Path, source: &[u8]) -> Result<Vec<u8>>;
}

/// Compiles WebAssembly text (`.wat`) in-process with the `wat` crate.
///
/// Single-file only: the text format has no module graph to follow, so no
/// external toolchain is needed.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WatTextTransform;

impl WatTextTransform {
    pub const EXTENSION: &'static str = "wat";
}

impl ModuleSourceTransform for WatTextTransform {
    fn name(&self) -> &'static str {
        "wat"
    }

    fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case(Self::EXTENSION))
    }

    fn transform(&self, path: &Path, source: &[u8]) -> Result<Vec<u8>> {
        let binary = wat::parse_bytes(source).map_err(|mut error| {
            error.set_path(path);
            error
        })?;
        Ok(binary.into_owned())
    }
}

pub(crate) fn default_module_source_transforms() -> Vec<Box<dyn ModuleSourceTransform>> {
    vec![Box::new(WatTextTransform)]
}
