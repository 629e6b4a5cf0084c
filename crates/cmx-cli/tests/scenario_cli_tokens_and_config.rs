//! CLI commands that need no database.
//!
//! GREEN when:
//! - `cmx token issue` prints a token the configured secret verifies, with the
//!   requested identity.
//! - Missing secret, bad role and bad uuid all fail without printing a token.
//! - `cmx config-hash` prints a 64-hex hash and canonical JSON, and refuses
//!   literal secrets.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

use cmx_auth::{JwtTokens, TokenService};
use cmx_schemas::Role;

const SECRET: &str = "cli-test-secret";

fn cmx() -> Command {
    let mut cmd = Command::cargo_bin("cmx").unwrap();
    cmd.env_remove("CMX_CONFIG")
        .env_remove("CMX_DATABASE_URL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn token_issue_round_trips() {
    let user_id = uuid::Uuid::new_v4();
    let out = cmx()
        .env("CMX_TOKEN_SECRET", SECRET)
        .args([
            "token",
            "issue",
            "--user-id",
            &user_id.to_string(),
            "--role",
            "staff",
            "--ttl-secs",
            "120",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("role=STAFF"))
        .stdout(predicate::str::contains("ttl_secs=120"))
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(out).unwrap();
    let token = stdout
        .lines()
        .find_map(|l| l.strip_prefix("token="))
        .expect("token line");

    let claims = JwtTokens::new(SECRET.as_bytes(), 1)
        .unwrap()
        .verify(token)
        .unwrap();
    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.role, Role::Staff);
    assert_eq!(claims.exp - claims.iat, 120);
}

#[test]
fn token_issue_failures() {
    let user_id = uuid::Uuid::new_v4().to_string();

    cmx()
        .env_remove("CMX_TOKEN_SECRET")
        .args(["token", "issue", "--user-id", &user_id, "--role", "CUSTOMER"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CMX_TOKEN_SECRET"))
        .stdout(predicate::str::contains("token=").not());

    cmx()
        .env("CMX_TOKEN_SECRET", SECRET)
        .args(["token", "issue", "--user-id", &user_id, "--role", "admin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid role"));

    cmx()
        .env("CMX_TOKEN_SECRET", SECRET)
        .args(["token", "issue", "--user-id", "nope", "--role", "STAFF"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid user_id"));
}

#[test]
fn config_hash_prints_hash_and_json() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"hub:\n  outbound_buffer: 8\n").unwrap();
    let path = f.path().to_string_lossy().into_owned();

    cmx()
        .args(["config-hash", &path])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"config_hash=[0-9a-f]{64}").unwrap())
        .stdout(predicate::str::contains(r#"{"hub":{"outbound_buffer":8}}"#));

    let mut leaky = tempfile::NamedTempFile::new().unwrap();
    leaky
        .write_all(b"auth:\n  token_secret_env: \"sk-live-0123456789\"\n")
        .unwrap();
    let leaky_path = leaky.path().to_string_lossy().into_owned();
    cmx()
        .args(["config-hash", &leaky_path])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("0123456789").not());
}
