//! Integration tests for the CLI interface
//!
//! Runs the binary against a stack state directory instead of CloudFormation

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = format!(
            "service: {}\nstage: {}\nservice_path: {}\n",
            common::SERVICE,
            common::STAGE,
            dir.path().display()
        );
        std::fs::write(dir.path().join("cfn-alias.yml"), config).unwrap();
        let compiled = serde_json::to_string_pretty(&common::compiled_value(Vec::new())).unwrap();
        std::fs::write(dir.path().join("compiled.json"), compiled).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn state_dir(&self) -> PathBuf {
        self.path().join("state")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("cfn-alias").unwrap();
        cmd.env_remove("CFN_ALIAS_STAGE")
            .env_remove("CFN_ALIAS_ALIAS")
            .env_remove("CFN_ALIAS_REGION")
            .arg("-c")
            .arg(self.path().join("cfn-alias.yml"))
            .arg("--state-dir")
            .arg(self.state_dir());
        cmd
    }
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = Command::cargo_bin("cfn-alias").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("remove-service"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("cfn-alias").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("cfn-alias").unwrap();
    cmd.arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_missing_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("cfn-alias").unwrap();
    cmd.arg("-c")
        .arg(temp_dir.path().join("missing.yml"))
        .arg("list")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Cannot read"));
}

#[test]
fn test_removing_stage_alias_is_refused() {
    let project = Project::new();
    project
        .cmd()
        .args(["remove", "--alias", common::STAGE])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("remove the service instead"));
}

#[test]
fn test_no_deploy_writes_alias_template() {
    let project = Project::new();
    project
        .cmd()
        .arg("deploy")
        .arg("--template")
        .arg(project.path().join("compiled.json"))
        .args(["--alias", "myAlias", "--no-deploy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"));

    let written = project
        .path()
        .join(".serverless")
        .join("cloudformation-template-create-alias-stack.json");
    let alias: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
    assert_eq!(alias["Resources"]["Testfct1Alias"]["Properties"]["Name"], "myAlias");
}

#[test]
fn test_deploy_then_list_and_remove() {
    let project = Project::new();
    project
        .cmd()
        .arg("deploy")
        .arg("--template")
        .arg(project.path().join("compiled.json"))
        .args(["--alias", "myAlias"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));

    project
        .cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("myAlias"));

    project
        .cmd()
        .args(["remove", "--alias", "myAlias"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed alias myAlias"));

    project
        .cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("myAlias").not());
}

#[test]
fn test_invalid_alias_character() {
    let project = Project::new();
    project
        .cmd()
        .arg("deploy")
        .arg("--template")
        .arg(project.path().join("compiled.json"))
        .args(["--alias", "my.alias"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("my.alias"));
}
