use std::fs::write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, NamedTempFile};

const SECRETS: [&str; 5] = [
    "GITHUB_TOKEN",
    "GITHUB_USERNAME",
    "GEMMA_API_KEY",
    "GMAIL_ADDRESS",
    "APP_LOG_DIR",
];

/// The binary with every secret removed so no test can reach the network.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("deploy-mailer").expect("Binary exists");
    for name in SECRETS {
        cmd.env_remove(name);
    }
    cmd
}

#[test]
fn help_lists_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("push")
                .and(predicate::str::contains("repos"))
                .and(predicate::str::contains("email"))
                .and(predicate::str::contains("whoami")),
        );
}

#[test]
fn invalid_repository_name_is_rejected_before_any_request() {
    let dir = tempdir().unwrap();
    write(dir.path().join("a.txt"), "a").unwrap();

    cmd()
        .args(["push", "--repo", "my repo!", "--dir"])
        .arg(dir.path())
        .env("GITHUB_TOKEN", "ghp_unused")
        .env("GITHUB_USERNAME", "octo")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid characters"));
}

#[test]
fn push_without_inputs_fails() {
    cmd()
        .args(["push", "--repo", "demo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to upload"));
}

#[test]
fn push_without_token_reports_missing_secret() {
    let dir = tempdir().unwrap();
    write(dir.path().join("a.txt"), "a").unwrap();

    cmd()
        .args(["push", "--repo", "demo", "--dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN is not set"));
}

#[test]
fn repos_list_requires_token() {
    cmd()
        .args(["repos", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn repos_delete_requires_names() {
    cmd().args(["repos", "delete"]).assert().failure();
}

#[test]
fn generate_requires_api_key() {
    cmd()
        .args([
            "email",
            "generate",
            "--job",
            "Backend Engineer, 3 yrs Python",
            "--skills",
            "Built REST APIs, PostgreSQL",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMMA_API_KEY is not set"));
}

#[test]
fn generate_rejects_blank_job_description() {
    cmd()
        .args(["email", "generate", "--job", "  ", "--skills", "Rust"])
        .env("GEMMA_API_KEY", "unused")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Job description must not be empty"));
}

#[test]
fn send_with_missing_draft_fails() {
    cmd()
        .args([
            "email",
            "send",
            "--draft",
            "/definitely/not/a/draft.yaml",
            "--to",
            "hr@corp.test",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read draft"));
}

#[test]
fn send_requires_sender_address() {
    let draft = NamedTempFile::new().unwrap();
    write(draft.path(), "subject: Hello\nbody: Dear team\n").unwrap();

    cmd()
        .args(["email", "send", "--to", "hr@corp.test", "--draft"])
        .arg(draft.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("GMAIL_ADDRESS"));
}

#[test]
fn invalid_config_file_is_reported() {
    let config = NamedTempFile::new().unwrap();
    write(config.path(), "not-yaml: [:::").unwrap();

    cmd()
        .arg("--config")
        .arg(config.path())
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config YAML"));
}
