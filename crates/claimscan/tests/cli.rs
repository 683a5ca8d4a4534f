use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn claimscan(dir: &Path) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("claimscan").into();
    cmd.current_dir(dir);
    cmd.env("NO_COLOR", "1");
    cmd.env("XDG_CONFIG_HOME", dir);
    cmd.env("CLAIMSCAN_LLM_URL", "http://127.0.0.1:9/chat");
    cmd.env("CLAIMSCAN_LLM_TIMEOUT", "1");
    cmd.env_remove("CLAIMSCAN_CONFIG");
    cmd
}

/// Tempdir holding a two-entry registry. Returns (guard, registry path).
fn workspace() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let registry = tmp.path().join("registry.json");
    fs::write(
        &registry,
        r#"[
            {"id": "A1B2", "canonical_name": "Riley HealthCare LLC"},
            {"id": "C3D4", "canonical_name": "Evergreen Farms Ltd."}
        ]"#,
    )
    .unwrap();
    (tmp, registry)
}

// --- Binary startup ---

#[test]
fn binary_runs() {
    let mut cmd: Command = cargo_bin_cmd!("claimscan").into();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("claimscan"));
}

// --- Match ---

#[test]
fn match_prints_registry_id() {
    let (tmp, registry) = workspace();
    claimscan(tmp.path())
        .args(["match", "--registry"])
        .arg(&registry)
        .arg("Riley Healthcare")
        .assert()
        .success()
        .stdout(predicate::str::contains("A1B2"));
}

#[test]
fn match_without_candidate_fails() {
    let (tmp, registry) = workspace();
    claimscan(tmp.path())
        .args(["match", "--registry"])
        .arg(&registry)
        .arg("Completely Different Company")
        .assert()
        .failure()
        .stdout(predicate::str::contains("No match found"));
}

#[test]
fn match_rejects_duplicate_registry_ids() {
    let tmp = TempDir::new().unwrap();
    let registry = tmp.path().join("registry.json");
    fs::write(
        &registry,
        r#"[{"id": "A1", "name": "Acme"}, {"id": "A1", "name": "Acme Two"}]"#,
    )
    .unwrap();

    claimscan(tmp.path())
        .args(["match", "--registry"])
        .arg(&registry)
        .arg("Acme")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate registry id"));
}

// --- Scan ---

#[test]
fn scan_text_claim() {
    let (tmp, registry) = workspace();
    let claim = tmp.path().join("claim.txt");
    fs::write(&claim, "Named Insured: Riley HealthCare LLC\nDate of loss: 2024-03-02").unwrap();

    claimscan(tmp.path())
        .args(["scan", "--registry"])
        .arg(&registry)
        .arg(&claim)
        .assert()
        .success()
        .stdout(predicate::str::contains("claim.txt\tRiley HealthCare LLC\tA1B2"));
}

#[test]
fn scan_json_output() {
    let (tmp, registry) = workspace();
    let claim = tmp.path().join("holder.txt");
    fs::write(&claim, "Policy Holder: Evergreen Farms Ltd").unwrap();

    let output = claimscan(tmp.path())
        .args(["scan", "--json", "--registry"])
        .arg(&registry)
        .arg(&claim)
        .output()
        .unwrap();

    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records[0]["matched_id"], "C3D4");
    assert_eq!(records[0]["status"], "done");
}

#[test]
fn scan_unsupported_file_exits_nonzero() {
    let (tmp, registry) = workspace();
    let good = tmp.path().join("claim.txt");
    let bad = tmp.path().join("photo.png");
    fs::write(&good, "Named Insured: Riley HealthCare LLC").unwrap();
    fs::write(&bad, [0x89, b'P', b'N', b'G']).unwrap();

    claimscan(tmp.path())
        .args(["scan", "--registry"])
        .arg(&registry)
        .arg(&good)
        .arg(&bad)
        .assert()
        .failure()
        .stdout(predicate::str::contains("A1B2"))
        .stderr(predicate::str::contains("1 of 2 documents failed"));
}

#[test]
fn scan_rejects_invalid_config() {
    let (tmp, registry) = workspace();
    let claim = tmp.path().join("claim.txt");
    fs::write(&claim, "Named Insured: Riley HealthCare LLC").unwrap();

    claimscan(tmp.path())
        .env("CLAIMSCAN_MATCH_THRESHOLD", "1.7")
        .args(["scan", "--registry"])
        .arg(&registry)
        .arg(&claim)
        .assert()
        .failure()
        .stderr(predicate::str::contains("threshold"));
}

// --- Extract ---

#[test]
fn extract_prints_text() {
    let tmp = TempDir::new().unwrap();
    let claim = tmp.path().join("notice.txt");
    fs::write(&claim, "Certificate Holder: Smith & Sons Co").unwrap();

    claimscan(tmp.path())
        .arg("extract")
        .arg(&claim)
        .assert()
        .success()
        .stdout(predicate::str::contains("Certificate Holder: Smith & Sons Co"))
        .stderr(predicate::str::contains("Smith & Sons Co"));
}
