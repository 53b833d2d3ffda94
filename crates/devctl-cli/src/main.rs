mod bootstrap_helpers;
mod cli_args;
mod commands;

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches};
use devctl_config::{discover_project_config, ProjectConfig};
use devctl_custom_command::{CustomCommandContext, CustomCommandDispatcher, DispatchOutcome};

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::{project_dir_hint, Cli, CliCommand};
use crate::commands::{render_commands, render_custom_commands_section, render_status};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let exit_code = match run_cli(std::env::args_os().collect()).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run_cli(args: Vec<OsString>) -> Result<i32> {
    let hinted_dir = match project_dir_hint(&args) {
        Some(dir) => dir,
        None => current_dir()?,
    };
    let hinted_project = discover_project_config(&hinted_dir);
    if let Err(error) = &hinted_project {
        tracing::debug!(error = %format!("{error:#}"), "project config unavailable for help");
    }

    let help_project = hinted_project.as_ref().ok().and_then(Option::as_ref);
    let mut command = Cli::command().after_help(render_custom_commands_section(help_project));
    let matches = match command.try_get_matches_from_mut(args) {
        Ok(matches) => matches,
        Err(error) => {
            error.print().context("failed to write usage")?;
            return Ok(error.exit_code());
        }
    };
    let cli = Cli::from_arg_matches(&matches)?;

    let start_dir = match cli.project_dir {
        Some(dir) => dir,
        None => current_dir()?,
    };
    let project = if start_dir == hinted_dir {
        hinted_project?
    } else {
        discover_project_config(&start_dir)?
    };

    match cli.command {
        CliCommand::Status => {
            print!("{}", render_status(project.as_ref()));
            Ok(0)
        }
        CliCommand::Commands => {
            print!("{}", render_commands(project.as_ref()));
            Ok(0)
        }
        CliCommand::External(argv) => run_custom_command(project.as_ref(), start_dir, argv).await,
    }
}

async fn run_custom_command(
    project: Option<&ProjectConfig>,
    start_dir: PathBuf,
    argv: Vec<String>,
) -> Result<i32> {
    let context = match project {
        Some(project) => CustomCommandContext::from_project(project)?,
        None => CustomCommandContext::without_project(start_dir),
    };
    let command = argv.first().cloned().unwrap_or_default();
    tracing::debug!(command = %command, "dispatching custom command");

    let outcome = CustomCommandDispatcher::default()
        .dispatch(&context, &command, &argv)
        .await;
    let exit_code = outcome.exit_code();
    if let DispatchOutcome::Failed(error) = outcome {
        eprintln!("Error: {error}");
    }
    Ok(exit_code)
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("failed to read the current directory")
}
