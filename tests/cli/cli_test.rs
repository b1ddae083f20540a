//! CLI contract tests for `mba-check`.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Config directory with a `config.toml` holding `body`.
fn config_with(body: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).expect("write config");
    (dir, path)
}

fn mba_check(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mba-check").expect("binary built");
    cmd.arg("--config").arg(config).env("RUST_LOG", "off");
    cmd
}

fn stdout_of(cmd: &mut Command) -> (bool, String) {
    let output = cmd.output().expect("runs");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    )
}

#[test]
fn policies_lists_example() {
    let (_dir, config) = config_with("");
    let (ok, stdout) = stdout_of(mba_check(&config).arg("policies"));
    assert!(ok);
    assert!(stdout.contains("example\tpcrs=0,1,2,3,4,5,6,7,8,9,14"), "{stdout}");
}

#[test]
fn refstate_fixture_is_accepted() {
    let (_dir, config) = config_with("");
    let (ok, stdout) = stdout_of(
        mba_check(&config)
            .arg("refstate")
            .arg(fixture("refstate.json")),
    );
    assert!(ok);
    assert!(stdout.contains("accepted by policy example"), "{stdout}");
}

#[test]
fn verify_good_log_passes() {
    let (_dir, config) = config_with("");
    let (ok, stdout) = stdout_of(
        mba_check(&config)
            .arg("verify")
            .arg("--refstate")
            .arg(fixture("refstate.json"))
            .arg("--log")
            .arg(fixture("log_good.json")),
    );
    assert!(ok, "{stdout}");
    assert!(stdout.starts_with("PASS policy=example events=22"), "{stdout}");
}

#[test]
fn verify_bad_grub_fails_with_json_report() {
    let (_dir, config) = config_with("");
    let (ok, stdout) = stdout_of(
        mba_check(&config)
            .arg("verify")
            .arg("--json")
            .arg("--refstate")
            .arg(fixture("refstate.json"))
            .arg("--log")
            .arg(fixture("log_bad_grub.json")),
    );
    assert!(!ok);
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("JSON report");
    assert_eq!(report["passed"], false);
    assert_eq!(report["failure"]["kind"], "field_mismatch");
    let message = report["failure"]["message"].as_str().unwrap_or_default();
    assert!(message.contains(".bsas[1]"), "{message}");
}

#[test]
fn verify_rejects_unlisted_pcr() {
    let (_dir, config) = config_with("");
    let (ok, stdout) = stdout_of(
        mba_check(&config)
            .arg("verify")
            .arg("--refstate")
            .arg(fixture("refstate.json"))
            .arg("--log")
            .arg(fixture("log_with_pcr10.json")),
    );
    assert!(!ok);
    assert!(stdout.contains("FAIL [Dispatch]"), "{stdout}");
}

#[test]
fn relevant_pcr_filter_drops_unlisted_pcr() {
    let (_dir, config) = config_with("[policy]\nonly_relevant_pcrs = true\n");
    let (ok, stdout) = stdout_of(
        mba_check(&config)
            .arg("verify")
            .arg("--refstate")
            .arg(fixture("refstate.json"))
            .arg("--log")
            .arg(fixture("log_with_pcr10.json")),
    );
    assert!(ok, "{stdout}");
    assert!(stdout.contains("events=22"), "{stdout}");
}

#[test]
fn unknown_policy_fails() {
    let (_dir, config) = config_with("");
    let (ok, _) = stdout_of(
        mba_check(&config)
            .arg("refstate")
            .arg(fixture("refstate.json"))
            .arg("--policy")
            .arg("nope"),
    );
    assert!(!ok);
}
