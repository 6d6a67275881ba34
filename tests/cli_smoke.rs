use assert_cmd::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;

const OVERRIDES: [&str; 4] = [
    "AUTOHEAL_POLICY",
    "AUTOHEAL_TRUST_THRESHOLD",
    "AUTOHEAL_WORKERS",
    "AUTOHEAL_CACHE_FILE",
];

fn autoheal(config: &Path) -> Command {
    let bin = assert_cmd::cargo::cargo_bin!("autoheal");
    let mut cmd = Command::new(bin);
    for key in OVERRIDES {
        cmd.env_remove(key);
    }
    cmd.env_remove("RUST_LOG");
    cmd.args(["--config", config.to_str().unwrap()]);
    cmd
}

fn login_fixture() -> PathBuf {
    let fixture = Path::new("tests/fixtures/login_page.yaml");
    assert!(fixture.exists(), "fixture missing");
    fixture.to_path_buf()
}

#[test]
fn resolve_heals_then_hits_cache() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("absent.yaml");
    let fixture = login_fixture();

    let assert = autoheal(&config)
        .args([
            "--output",
            "json",
            "resolve",
            "--fixture",
            fixture.to_str().unwrap(),
            "--repeat",
            "2",
        ])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output");
    let value: Value = serde_json::from_str(extract_json(&stdout)).expect("valid json");

    let resolutions = value["resolutions"].as_array().unwrap();
    assert_eq!(resolutions.len(), 2);
    assert_eq!(
        resolutions[0]["result"]["strategy"].as_str(),
        Some("STRUCTURAL_ANALYSIS")
    );
    assert_eq!(
        resolutions[0]["result"]["selector"].as_str(),
        Some("button.btn-primary[type=submit]")
    );
    assert_eq!(resolutions[1]["result"]["strategy"].as_str(), Some("CACHED"));
    assert_eq!(resolutions[1]["result"]["from_cache"].as_bool(), Some(true));

    assert_eq!(value["analysis_calls"]["structural"].as_u64(), Some(1));
    assert_eq!(value["analysis_calls"]["visual"].as_u64(), Some(0));
    assert_eq!(value["metrics"]["successes"].as_u64(), Some(2));
    assert_eq!(value["health"]["overall"].as_bool(), Some(true));
}

#[test]
fn unresolvable_selector_fails_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("absent.yaml");
    let fixture = login_fixture();

    autoheal(&config)
        .args([
            "resolve",
            "--fixture",
            fixture.to_str().unwrap(),
            "--selector",
            "#missing",
            "--no-cache",
            "--policy",
            "visual-only",
        ])
        .env("AUTOHEAL_WORKERS", "1")
        .assert()
        .failure();
}

#[test]
fn file_cache_is_visible_to_cache_stats() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("absent.yaml");
    let cache_file = dir.path().join("selectors.json");
    let fixture = login_fixture();

    autoheal(&config)
        .env("AUTOHEAL_CACHE_FILE", &cache_file)
        .args(["resolve", "--fixture", fixture.to_str().unwrap()])
        .assert()
        .success();
    assert!(cache_file.exists());

    let assert = autoheal(&config)
        .env("AUTOHEAL_CACHE_FILE", &cache_file)
        .args(["--output", "json", "cache", "stats"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output");
    let value: Value = serde_json::from_str(extract_json(&stdout)).expect("valid json");
    let entries = value["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0]["selector"].as_str(),
        Some("button.btn-primary[type=submit]")
    );

    autoheal(&config)
        .env("AUTOHEAL_CACHE_FILE", &cache_file)
        .args(["cache", "clear"])
        .assert()
        .success();
}

#[test]
fn config_validate_accepts_defaults_and_rejects_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    autoheal(&dir.path().join("absent.yaml"))
        .args(["config", "validate"])
        .assert()
        .success();

    let bad = dir.path().join("bad.yaml");
    std::fs::write(&bad, "trust:\n  trust_threshold: 0.5\n").unwrap();
    autoheal(&bad).args(["config", "validate"]).assert().success();

    std::fs::write(&bad, "trust:\n  trust_threshold: 3.0\n").unwrap();
    autoheal(&bad).args(["config", "validate"]).assert().failure();
}

#[test]
fn config_show_prints_effective_policy() {
    let dir = tempfile::tempdir().unwrap();
    let assert = autoheal(&dir.path().join("absent.yaml"))
        .env("AUTOHEAL_POLICY", "parallel")
        .args(["--output", "json", "config", "show"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 output");
    let value: Value = serde_json::from_str(extract_json(&stdout)).expect("valid json");
    assert_eq!(value["engine"]["policy"].as_str(), Some("parallel"));
    assert_eq!(value["trust"]["trust_threshold"].as_f64(), Some(0.7));
}

fn extract_json(output: &str) -> &str {
    let start = output.find('{').expect("json start");
    let end = output.rfind('}').expect("json end");
    &output[start..=end]
}
