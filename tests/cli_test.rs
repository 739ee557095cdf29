use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

// keep ambient configuration out of the assertions
fn lockpointd() -> Command {
    let mut cmd = Command::new(cargo_bin!("lockpointd"));
    cmd.env_remove("LOCKPOINT_AUTH_SECRET")
        .env_remove("LOCKPOINT_DATABASE_URL")
        .env_remove("LOCKPOINT_STORAGE")
        .env_remove("LOCKPOINT_SQLITE_MAX_CONNECTIONS")
        .env_remove("LOCKPOINT_TOKEN_TTL_SECONDS")
        .env_remove("DATABASE_URL");
    cmd
}

#[test]
fn test_help_lists_flags() {
    lockpointd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--listen"))
        .stdout(predicate::str::contains("--storage"))
        .stdout(predicate::str::contains("--auth-secret"));
}

#[test]
fn test_auth_secret_is_required() {
    lockpointd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--auth-secret"));
}

#[test]
fn test_short_auth_secret_is_rejected() {
    lockpointd()
        .args(["--auth-secret", "too-short", "--storage", "memory"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("32 characters"));
}

#[test]
fn test_sqlite_mode_requires_database_url() {
    lockpointd()
        .args([
            "--auth-secret",
            "a-perfectly-reasonable-32-char-secret!!!",
            "--storage",
            "sqlite",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("LOCKPOINT_DATABASE_URL"));
}
