use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub(crate) const PROJECT_DIR_ENV: &str = "DEVCTL_PROJECT_DIR";
const PROJECT_DIR_FLAG: &str = "--project-dir";

#[derive(Debug, Parser)]
#[command(
    name = "devctl",
    about = "Local development environment controller",
    version,
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    #[arg(
        long = "project-dir",
        env = PROJECT_DIR_ENV,
        global = true,
        help = "Directory where the project config search starts (defaults to the current directory)"
    )]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    /// Output information about the current settings
    Status,
    /// List the custom commands declared by the project
    Commands,
    /// Any other id is looked up in the project's custom commands
    #[command(external_subcommand)]
    External(Vec<String>),
}

/// Finds the search start before clap runs, so root help can list custom commands.
///
/// Scanning stops at the first positional argument; anything after a custom
/// command id belongs to the handler.
pub(crate) fn project_dir_hint(args: &[OsString]) -> Option<PathBuf> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" || !arg.to_string_lossy().starts_with('-') {
            break;
        }
        if arg == PROJECT_DIR_FLAG {
            return iter.next().map(PathBuf::from);
        }
        if let Some(value) = arg
            .to_str()
            .and_then(|arg| arg.strip_prefix(PROJECT_DIR_FLAG))
            .and_then(|rest| rest.strip_prefix('='))
        {
            return Some(PathBuf::from(value));
        }
    }
    std::env::var_os(PROJECT_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
