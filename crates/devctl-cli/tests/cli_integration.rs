use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const PROJECT_CONFIG: &str = r#"
services:
  - name: api
    path: ./api
    notes: Listens on :8080
commands:
  - name: greet
    description: Print a greeting
    handler: ./scripts/greet.sh
  - name: fail
    handler: ./scripts/fail.sh
  - name: notice
    description: Module handler smoke test
    handler: ./handlers/notice
  - name: gone
    handler: ./scripts/gone.sh
"#;

const NOTICE_MODULE: &str = r#"(module
  (import "devctl" "print" (func $print (param i32 i32)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (data (i32.const 0) "notice ok\n")
  (func (export "devctl_alloc") (param $len i32) (result i32)
    (local $ptr i32)
    global.get $heap
    local.set $ptr
    global.get $heap
    local.get $len
    i32.add
    global.set $heap
    local.get $ptr)
  (func (export "default") (param $ptr i32) (param $len i32) (result i32)
    i32.const 0
    i32.const 9
    call $print
    i32.const 0)
)"#;

fn write_project(root: &Path) {
    fs::write(root.join(".devctl.yaml"), PROJECT_CONFIG).expect("write config");
    fs::create_dir_all(root.join("scripts")).expect("mkdir scripts");
    fs::write(
        root.join("scripts/greet.sh"),
        "echo \"hello $1\"\npwd > greet-cwd.txt\n",
    )
    .expect("write greet");
    fs::write(root.join("scripts/fail.sh"), "echo failing >&2\nexit 7\n").expect("write fail");
    fs::create_dir_all(root.join("handlers/notice")).expect("mkdir notice");
    fs::write(root.join("handlers/notice/index.wat"), NOTICE_MODULE).expect("write notice");
}

fn devctl(project_dir: &Path) -> Command {
    let mut command = Command::cargo_bin("devctl").expect("binary should build");
    command
        .env_remove("DEVCTL_PROJECT_DIR")
        .env_remove("RUST_LOG")
        .current_dir(project_dir);
    command
}

#[test]
fn integration_script_handler_runs_through_shell_with_derived_args() {
    let temp = tempdir().expect("tempdir");
    write_project(temp.path());

    devctl(temp.path())
        .args(["greet", "world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world"));

    let recorded = fs::read_to_string(temp.path().join("greet-cwd.txt")).expect("cwd file");
    assert_eq!(
        fs::canonicalize(recorded.trim()).expect("canonical"),
        fs::canonicalize(temp.path()).expect("canonical")
    );
}

#[test]
fn integration_handler_exit_code_is_mirrored() {
    let temp = tempdir().expect("tempdir");
    write_project(temp.path());

    devctl(temp.path())
        .arg("fail")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("failing"))
        .stderr(predicate::str::contains(
            "Error: Custom command \"fail\" exited with code 7",
        ));
}

#[test]
fn integration_module_handler_prints_through_host_import() {
    let temp = tempdir().expect("tempdir");
    write_project(temp.path());

    devctl(temp.path())
        .args(["notice", "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("notice ok"));
}

#[test]
fn regression_unknown_command_reports_not_found_and_exits_one() {
    let temp = tempdir().expect("tempdir");
    write_project(temp.path());

    devctl(temp.path())
        .arg("deploy")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error: command deploy not found"));
}

#[test]
fn regression_missing_handler_file_names_the_attempted_path() {
    let temp = tempdir().expect("tempdir");
    write_project(temp.path());

    devctl(temp.path())
        .arg("gone")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("handler not found at"))
        .stderr(predicate::str::contains("gone.sh"));
}

#[test]
fn functional_project_dir_flag_is_used_from_another_directory() {
    let temp = tempdir().expect("tempdir");
    let project = temp.path().join("project");
    let elsewhere = temp.path().join("elsewhere");
    fs::create_dir_all(&project).expect("mkdir project");
    fs::create_dir_all(&elsewhere).expect("mkdir elsewhere");
    write_project(&project);

    devctl(&elsewhere)
        .arg("--project-dir")
        .arg(&project)
        .args(["greet", "there"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello there"));
}

#[test]
fn functional_root_help_lists_custom_commands() {
    let temp = tempdir().expect("tempdir");
    write_project(temp.path());

    devctl(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("CUSTOM COMMANDS"))
        .stdout(predicate::str::contains("greet"))
        .stdout(predicate::str::contains("Print a greeting"));
}

#[test]
fn functional_builtin_commands_and_status_render() {
    let temp = tempdir().expect("tempdir");
    write_project(temp.path());
    fs::write(temp.path().join(".devctl-current.yaml"), "services:\n  - api\n")
        .expect("write state");

    devctl(temp.path())
        .arg("commands")
        .assert()
        .success()
        .stdout(predicate::str::contains("notice"))
        .stdout(predicate::str::contains("Module handler smoke test"));

    devctl(temp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("devctl v"))
        .stdout(predicate::str::contains("Listens on :8080"));
}

#[test]
fn regression_outside_any_project_custom_commands_are_not_found() {
    let temp = tempdir().expect("tempdir");

    devctl(temp.path())
        .arg("greet")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("command greet not found"));
}

#[test]
fn regression_module_status_outside_exit_range_never_exits_zero() {
    let temp = tempdir().expect("tempdir");
    fs::write(
        temp.path().join(".devctl.yaml"),
        "commands:\n  - name: overflow\n    handler: ./overflow.wat\n",
    )
    .expect("write config");
    fs::write(
        temp.path().join("overflow.wat"),
        r#"(module
  (memory (export "memory") 1)
  (func (export "devctl_alloc") (param $len i32) (result i32)
    i32.const 1024)
  (func (export "default") (param $ptr i32) (param $len i32) (result i32)
    i32.const 256)
)"#,
    )
    .expect("write module");

    devctl(temp.path())
        .arg("overflow")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("returned status 256"));
}
