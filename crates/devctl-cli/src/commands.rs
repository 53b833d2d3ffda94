use std::fmt::Write as _;

use devctl_config::{CustomCommandEntry, ProjectConfig};

pub(crate) const CUSTOM_COMMANDS_HEADING: &str = "CUSTOM COMMANDS";
const NO_SERVICES_MESSAGE: &str = "No services configured";
const NO_COMMANDS_MESSAGE: &str = "No custom commands configured";

/// Root help section listing the project's custom commands; empty when there are none.
pub(crate) fn render_custom_commands_section(project: Option<&ProjectConfig>) -> String {
    let commands = project.map(|project| project.commands.as_slice()).unwrap_or(&[]);
    if commands.is_empty() {
        return String::new();
    }
    format!(
        "{CUSTOM_COMMANDS_HEADING}\n{}",
        render_command_list(commands)
    )
}

pub(crate) fn render_commands(project: Option<&ProjectConfig>) -> String {
    let commands = project.map(|project| project.commands.as_slice()).unwrap_or(&[]);
    if commands.is_empty() {
        return format!("{NO_COMMANDS_MESSAGE}\n");
    }
    render_command_list(commands)
}

fn render_command_list(commands: &[CustomCommandEntry]) -> String {
    let width = commands
        .iter()
        .map(|entry| entry.name.len())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for entry in commands {
        let description = entry.description.as_deref().unwrap_or("");
        let line = format!("  {:<width$}  {description}", entry.name);
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

/// Version line followed by the services last brought up and their notes.
pub(crate) fn render_status(project: Option<&ProjectConfig>) -> String {
    let mut out = format!("devctl v{}\n\n", env!("CARGO_PKG_VERSION"));
    let services = project
        .map(|project| project.current.services.as_slice())
        .unwrap_or(&[]);
    if services.is_empty() {
        let _ = writeln!(out, "{NO_SERVICES_MESSAGE}");
        return out;
    }

    let _ = writeln!(out, "Service / Notes");
    for name in services {
        let notes = project
            .and_then(|project| project.services.get(name))
            .and_then(|service| service.notes.as_deref())
            .unwrap_or("")
            .trim();
        let _ = writeln!(out, "{name}");
        for line in notes.lines() {
            let _ = writeln!(out, "    {line}");
        }
    }
    out
}
