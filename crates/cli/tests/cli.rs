use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const CLEARED_ENV: &[&str] = &[
    "LTD_HOST",
    "LTD_USERNAME",
    "LTD_PASSWORD",
    "LTD_ORG",
    "LTD_SKIP_UPLOAD",
    "TRAVIS_EVENT_TYPE",
    "TRAVIS_BRANCH",
    "GITHUB_EVENT_NAME",
    "GITHUB_REF",
    "GITHUB_HEAD_REF",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_PROFILE",
    "FASTLY_SERVICE_ID",
    "FASTLY_API_KEY",
    "RUST_LOG",
];

/// The `ltd` binary with an empty home directory and no CI or credential
/// variables from the surrounding environment
fn ltd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ltd").expect("Binary exists");
    cmd.env("HOME", home.path());
    for name in CLEARED_ENV {
        cmd.env_remove(name);
    }
    cmd
}

fn write_config(home: &TempDir, content: &str) {
    let dir = home.path().join(".config").join("ltd-conveyor");
    fs::create_dir_all(&dir).expect("Creating config dir failed");
    fs::write(dir.join("config.toml"), content).expect("Writing config failed");
}

#[test]
fn help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("upload")
                .and(predicate::str::contains("sync"))
                .and(predicate::str::contains("copy"))
                .and(predicate::str::contains("delete"))
                .and(predicate::str::contains("purge")),
        );
}

#[test]
fn upload_skip_flag_is_a_no_op() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["upload", "--product", "docs", "--skip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipping ltd upload."));
}

#[test]
fn upload_skip_from_environment() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["upload", "--product", "docs"])
        .env("LTD_SKIP_UPLOAD", "true")
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipping ltd upload."));
}

#[test]
fn upload_without_credentials_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["upload", "--product", "docs", "--git-ref", "main"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("username and password"));
}

#[test]
fn upload_without_git_ref_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["-u", "travis", "-p", "secret", "upload", "--product", "docs"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--git-ref is required."));
}

#[test]
fn upload_skips_travis_pull_requests_by_default() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["upload", "--product", "docs", "--travis"])
        .env("TRAVIS_EVENT_TYPE", "pull_request")
        .env("TRAVIS_BRANCH", "tickets/DM-1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipping upload on Travis pull request event."));
}

#[test]
fn upload_travis_requires_event_type() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["upload", "--product", "docs", "--travis"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("TRAVIS_EVENT_TYPE"));
}

#[test]
fn upload_rejects_both_ci_flags() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["upload", "--product", "docs", "--travis", "--gh"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn sync_requires_aws_credentials() {
    let home = TempDir::new().unwrap();
    let site = TempDir::new().unwrap();
    ltd(&home)
        .args(["sync", "--bucket", "docs-bucket", "--path", "builds/1", "--dir"])
        .arg(site.path())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("AWS credentials are required"));
}

#[test]
fn purge_requires_service_id() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["purge", "--surrogate-key", "abc123", "--api-key", "secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Fastly service ID"));
}

#[test]
fn invalid_log_level_is_rejected() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["--log-level", "trace", "config", "show"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn config_show_merges_file_and_flags() {
    let home = TempDir::new().unwrap();
    write_config(
        &home,
        r#"
[keeper]
host = "https://keeper.example.org"
username = "travis"
org = "rubin"

[aws]
profile = "docs"
"#,
    );

    ltd(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("https://keeper.example.org")
                .and(predicate::str::contains("travis"))
                .and(predicate::str::contains("rubin"))
                .and(predicate::str::contains("Profile 'docs'")),
        );

    ltd(&home)
        .args(["--host", "https://other.example.org", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://other.example.org"));
}

#[test]
fn config_validate_rejects_bad_log_level() {
    let home = TempDir::new().unwrap();
    write_config(&home, "[logging]\nlevel = \"trace\"\n");

    ltd(&home)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid log level"));
}

#[test]
fn config_validate_without_file_fails() {
    let home = TempDir::new().unwrap();
    ltd(&home)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}
