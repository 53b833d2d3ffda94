//! Project configuration discovery and last-known-state storage for devctl.
//!
//! Locates the nearest `.devctl.*` project file, normalizes its services,
//! environments, and custom command entries, and reads the
//! `.devctl-current.yaml` selection state.

pub mod current_state;
pub mod project_config;

pub use current_state::{load_current_state, CurrentState, DockerHost};
pub use project_config::{
    discover_project_config, load_project_config, CustomCommandEntry, EnvironmentConfigEntry,
    ProjectConfig, ProjectPaths, ServiceConfigEntry, PROJECT_CONFIG_SEARCH_PLACES,
};
