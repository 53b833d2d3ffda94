use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::current_state::{load_current_state, CurrentState};

/// File names probed in each directory, in priority order.
pub const PROJECT_CONFIG_SEARCH_PLACES: &[&str] = &[
    ".devctl.json",
    ".devctl.yaml",
    ".devctl.yml",
    ".devctlrc.json",
    ".devctlrc.yaml",
    ".devctlrc.yml",
    "package.json",
];
const PACKAGE_JSON_FILE_NAME: &str = "package.json";
const PACKAGE_JSON_CONFIG_KEY: &str = "devctl";
const COMPOSE_FILE_NAME: &str = ".devctl-docker-compose.yaml";
const CURRENT_STATE_FILE_NAME: &str = ".devctl-current.yaml";
const SCRIPTS_FILE_NAME: &str = ".devctl-scripts.yaml";
// Keys the loader derives itself; user-supplied values are dropped.
const DERIVED_KEYS: &[&str] = &["cwd", "paths", "current"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A project-declared command name and the handler that satisfies it.
pub struct CustomCommandEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub handler: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfigEntry {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfigEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Files derived from the project directory.
pub struct ProjectPaths {
    pub project: PathBuf,
    pub compose: PathBuf,
    pub current: PathBuf,
    pub scripts: PathBuf,
}

impl ProjectPaths {
    fn for_project_file(project: &Path, cwd: &Path) -> Self {
        Self {
            project: project.to_path_buf(),
            compose: cwd.join(COMPOSE_FILE_NAME),
            current: cwd.join(CURRENT_STATE_FILE_NAME),
            scripts: cwd.join(SCRIPTS_FILE_NAME),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectConfigFile {
    #[serde(default)]
    services: Vec<ServiceConfigEntry>,
    #[serde(default)]
    environment: Vec<EnvironmentConfigEntry>,
    #[serde(default)]
    commands: Vec<CustomCommandEntry>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Normalized project configuration with services and environments keyed by name.
pub struct ProjectConfig {
    pub services: BTreeMap<String, ServiceConfigEntry>,
    pub environment: BTreeMap<String, EnvironmentConfigEntry>,
    pub commands: Vec<CustomCommandEntry>,
    pub current: CurrentState,
    pub cwd: PathBuf,
    pub paths: ProjectPaths,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectConfig {
    /// JSON rendering handed to in-process command handlers.
    pub fn to_payload_value(&self) -> Result<Value> {
        serde_json::to_value(self).context("failed to render project config as JSON")
    }
}

/// Walks `start_dir` and its ancestors for the nearest project config.
pub fn discover_project_config(start_dir: &Path) -> Result<Option<ProjectConfig>> {
    let start_dir = std::path::absolute(start_dir)
        .with_context(|| format!("failed to resolve {}", start_dir.display()))?;
    for dir in start_dir.ancestors() {
        for place in PROJECT_CONFIG_SEARCH_PLACES {
            let candidate = dir.join(place);
            if !candidate.is_file() {
                continue;
            }
            if let Some(file) = read_project_config_file(&candidate)? {
                tracing::debug!(path = %candidate.display(), "loaded project config");
                return build_project_config(&candidate, file).map(Some);
            }
        }
    }
    Ok(None)
}

/// Loads a specific project config file; `package.json` must carry a `devctl` key.
pub fn load_project_config(path: &Path) -> Result<ProjectConfig> {
    let path = std::path::absolute(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    match read_project_config_file(&path)? {
        Some(file) => build_project_config(&path, file),
        None => bail!(
            "{} does not contain a '{}' section",
            path.display(),
            PACKAGE_JSON_CONFIG_KEY
        ),
    }
}

fn read_project_config_file(path: &Path) -> Result<Option<ProjectConfigFile>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read project config {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    if file_name == PACKAGE_JSON_FILE_NAME {
        let mut manifest: Map<String, Value> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        return match manifest.remove(PACKAGE_JSON_CONFIG_KEY) {
            Some(section) => serde_json::from_value(section)
                .with_context(|| {
                    format!(
                        "failed to parse '{}' section of {}",
                        PACKAGE_JSON_CONFIG_KEY,
                        path.display()
                    )
                })
                .map(Some),
            None => Ok(None),
        };
    }

    let parsed = if file_name.ends_with(".json") {
        serde_json::from_str::<Option<ProjectConfigFile>>(&raw)
            .with_context(|| format!("failed to parse project config {}", path.display()))?
    } else {
        serde_yaml::from_str::<Option<ProjectConfigFile>>(&raw)
            .with_context(|| format!("failed to parse project config {}", path.display()))?
    };
    // An empty file is still a project marker.
    Ok(Some(parsed.unwrap_or(ProjectConfigFile {
        services: Vec::new(),
        environment: Vec::new(),
        commands: Vec::new(),
        extra: Map::new(),
    })))
}

fn build_project_config(path: &Path, file: ProjectConfigFile) -> Result<ProjectConfig> {
    let cwd = path
        .parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("project config {} has no parent directory", path.display()))?;
    validate_command_entries(path, &file.commands)?;

    let paths = ProjectPaths::for_project_file(path, &cwd);
    let current = load_current_state(&paths.current);
    let services = file
        .services
        .into_iter()
        .map(|service| (service.name.clone(), service))
        .collect();
    let environment = file
        .environment
        .into_iter()
        .map(|environment| (environment.name.clone(), environment))
        .collect();
    let mut extra = file.extra;
    for key in DERIVED_KEYS {
        extra.remove(*key);
    }

    Ok(ProjectConfig {
        services,
        environment,
        commands: file.commands,
        current,
        cwd,
        paths,
        extra,
    })
}

fn validate_command_entries(path: &Path, commands: &[CustomCommandEntry]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for (index, entry) in commands.iter().enumerate() {
        if entry.name.trim().is_empty() {
            bail!(
                "{}: commands[{index}] is missing a name",
                path.display()
            );
        }
        if entry.handler.trim().is_empty() {
            bail!(
                "{}: command '{}' is missing a handler",
                path.display(),
                entry.name
            );
        }
        if !seen.insert(entry.name.as_str()) {
            tracing::warn!(
                command = %entry.name,
                "duplicate custom command entry; the first definition wins"
            );
        }
    }
    Ok(())
}
