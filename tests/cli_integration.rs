//! CLI integration tests
//!
//! These run the built `shipbox` binary and check exit codes, stdout and the
//! files it leaves behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn shipbox(args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shipbox"));
    for var in [
        "SHIPBOX_BUILD_CONTEXT_LIMIT",
        "SHIPBOX_CONTEXT_SOFT_LIMIT",
        "SHIPBOX_CONTEXT_FILE_LIMIT",
        "SHIPBOX_CONCURRENCY",
        "SHIPBOX_LOG_LEVEL",
        "SHIPBOX_LOG_JSON",
        "RUST_LOG",
    ] {
        command.env_remove(var);
    }
    command.args(args).output().expect("Failed to execute shipbox")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Writes a two-service project: `api` is built from `./api`, `db` is a managed Postgres
fn create_project(dir: &TempDir) -> PathBuf {
    let root = dir.path();
    fs::create_dir_all(root.join("api/src")).unwrap();
    fs::write(root.join("api/Dockerfile"), "FROM rust:1.75\nCOPY . /app\n").unwrap();
    fs::write(root.join("api/src/main.rs"), "fn main() {}\n").unwrap();

    let project = r#"
name: demo
services:
  - name: api
    build:
      context: ./api
    ports:
      - target: 8080
        mode: ingress
        protocol: http
    healthcheck:
      test: ["CMD", "curl", "-f", "http://localhost:8080/"]
    environment:
      DATABASE_URL: postgres://db:5432/app
      DB_PASSWORD: hunter2
  - name: db
    image: postgres:16
    extensions:
      x-defang-postgres: true
"#;
    let path = root.join("project.yaml");
    fs::write(&path, project).unwrap();
    path
}

#[test]
fn test_cli_help() {
    let output = shipbox(&["--help"]);
    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("shipbox"));
    assert!(stdout.contains("package"));
    assert!(stdout.contains("validate"));
    assert!(stdout.contains("fixup"));
}

#[test]
fn test_cli_version() {
    let output = shipbox(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_package_writes_archive() {
    let dir = TempDir::new().unwrap();
    create_project(&dir);
    let context = dir.path().join("api");
    let archive = dir.path().join("context.tar.gz");

    let output = shipbox(&["-q", "package", &path_arg(&context), "-o", &path_arg(&archive)]);
    assert!(output.status.success());
    let digest = stdout(&output).trim().to_string();
    assert!(digest.starts_with("sha256-"), "{}", digest);
    assert!(fs::metadata(&archive).unwrap().len() > 0);

    // Same inputs, same digest
    let again = shipbox(&["-q", "package", &path_arg(&context)]);
    assert_eq!(stdout(&again).trim(), digest);
}

#[test]
fn test_package_missing_dockerfile_fails() {
    let dir = TempDir::new().unwrap();
    let output = shipbox(&["package", &path_arg(dir.path())]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_validate_valid_project() {
    let dir = TempDir::new().unwrap();
    let project = create_project(&dir);
    let output = shipbox(&["validate", &path_arg(&project), "--format", "json"]);
    assert_eq!(output.status.code(), Some(0));

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["valid"], true);
}

#[test]
fn test_validate_invalid_project_exits_2() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("project.json");
    fs::write(
        &project,
        r#"{"name": "demo", "services": [{"name": "api", "hostname": "api.local", "image": "app"}]}"#,
    )
    .unwrap();

    let output = shipbox(&["validate", &path_arg(&project), "-f", "json"]);
    assert_eq!(output.status.code(), Some(2));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["valid"], false);
    assert_eq!(report["errors"][0]["service"], "api");
    assert_eq!(report["errors"][0]["rule"], "ServiceDirectives");
}

#[test]
fn test_validate_missing_file_exits_1() {
    let output = shipbox(&["validate", "/nonexistent/project.yaml"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_fixup_json_output() {
    let dir = TempDir::new().unwrap();
    let project = create_project(&dir);
    let store = dir.path().join("store");

    let output = shipbox(&[
        "fixup",
        &path_arg(&project),
        "--store",
        &path_arg(&store),
        "--config",
        "DB_PASSWORD",
        "--format",
        "json",
    ]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let fixup: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(fixup["project"], "demo");

    let api = &fixup["services"][0];
    let url = api["build_context"]["url"].as_str().unwrap();
    assert!(url.starts_with("file://"), "{}", url);
    assert!(api["build_context"]["digest"].as_str().unwrap().starts_with("sha256-"));
    assert_eq!(
        api["service"]["environment"]["DATABASE_URL"],
        "postgres://db.demo.internal:5432/app"
    );
    assert!(api["service"]["environment"]["DB_PASSWORD"].is_null());
    assert_eq!(api["config"]["DB_PASSWORD"]["source"], "config");
    assert_eq!(api["config"]["DB_PASSWORD"]["value"], "*****");

    let db = &fixup["services"][1];
    assert_eq!(db["service"]["ports"][0]["target"], 5432);
    assert_eq!(db["service"]["ports"][0]["mode"], "host");

    assert_eq!(fs::read_dir(store.join("uploads")).unwrap().count(), 1);
}

#[test]
fn test_fixup_invalid_project_exits_2() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("project.yaml");
    fs::write(&project, "name: demo\nservices:\n  - name: api\n").unwrap();

    let output = shipbox(&["fixup", &path_arg(&project), "--store", &path_arg(dir.path())]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("uploads").exists());
}
