use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Last selected services and environment, stored in `.devctl-current.yaml`.
pub struct CurrentState {
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_dockerhost"
    )]
    pub dockerhost: Option<DockerHost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Host address reachable from inside containers, remembered between runs.
pub struct DockerHost {
    pub address: String,
    pub interface_name: String,
}

// Older state files store an empty string when no host was detected.
fn deserialize_dockerhost<'de, D>(deserializer: D) -> Result<Option<DockerHost>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StoredDockerHost {
        Host(DockerHost),
        Blank(String),
    }

    Ok(
        match Option::<StoredDockerHost>::deserialize(deserializer)? {
            Some(StoredDockerHost::Host(host)) => Some(host),
            Some(StoredDockerHost::Blank(_)) | None => None,
        },
    )
}

/// Reads the state file; a missing, empty, or unreadable file yields the default.
pub fn load_current_state(path: &Path) -> CurrentState {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::debug!(path = %path.display(), %error, "no current state file");
            return CurrentState::default();
        }
    };
    if raw.trim().is_empty() {
        return CurrentState::default();
    }
    match serde_yaml::from_str::<Option<CurrentState>>(&raw) {
        Ok(state) => state.unwrap_or_default(),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "ignoring unparsable current state file");
            CurrentState::default()
        }
    }
}
