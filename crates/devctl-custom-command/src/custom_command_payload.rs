use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
/// JSON document handed to module handlers; field names are a public contract.
pub struct CustomCommandPayload {
    pub args: Vec<String>,
    pub argv: Vec<String>,
    pub command: String,
    pub cwd: PathBuf,
    pub config: Value,
    pub project: Value,
}

/// Handler arguments: `argv` without a leading copy of the command id.
pub fn derive_handler_args(argv: &[String], command: &str) -> Vec<String> {
    match argv.split_first() {
        Some((first, rest)) if first == command => rest.to_vec(),
        _ => argv.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::{derive_handler_args, CustomCommandPayload};
    use serde_json::json;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn unit_derive_handler_args_strips_only_leading_command_id() {
        assert_eq!(
            derive_handler_args(&strings(&["db:reset", "--force"]), "db:reset"),
            strings(&["--force"])
        );
        assert_eq!(
            derive_handler_args(&strings(&["--force", "db:reset"]), "db:reset"),
            strings(&["--force", "db:reset"])
        );
        assert_eq!(
            derive_handler_args(&strings(&["db:reset", "db:reset"]), "db:reset"),
            strings(&["db:reset"])
        );
        assert!(derive_handler_args(&[], "db:reset").is_empty());
    }

    #[test]
    fn functional_payload_serializes_contract_field_names() {
        let payload = CustomCommandPayload {
            args: strings(&["a"]),
            argv: strings(&["greet", "a"]),
            command: "greet".to_string(),
            cwd: "/repo".into(),
            config: json!({"commands": []}),
            project: json!({"commands": []}),
        };
        assert_eq!(
            serde_json::to_value(&payload).expect("serialize"),
            json!({
                "args": ["a"],
                "argv": ["greet", "a"],
                "command": "greet",
                "cwd": "/repo",
                "config": {"commands": []},
                "project": {"commands": []},
            })
        );
    }
}
