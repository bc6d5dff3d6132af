#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: apply and approve one card
    let mut script1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        script1,
        r#"{{"command":"apply","alias":"a","name":"Uma","email":"uma@example.com","phone":"9000011111","vehicle":"GJ01AA1111","plan":"FAMILY"}}"#
    )
    .unwrap();
    writeln!(script1, r#"{{"command":"approve","applicationId":"@a"}}"#).unwrap();

    let mut cmd1 = Command::new(cargo_bin!("parkcard"));
    cmd1.env("PHONEPE_BYPASS", "true")
        .arg("--db-path")
        .arg(&db_path)
        .arg("replay")
        .arg(script1.path())
        .arg("--start-at")
        .arg("2026-03-02T03:30:00Z");

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("\"cardNumber\":\"0100\""));

    // 2. Second run: a new approval continues the recovered sequence
    let mut script2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        script2,
        r#"{{"command":"apply","alias":"b","name":"Yash","email":"yash@example.com","phone":"9000022222","vehicle":"GJ01BB2222","plan":"PREMIUM"}}"#
    )
    .unwrap();
    writeln!(script2, r#"{{"command":"approve","applicationId":"@b"}}"#).unwrap();

    let mut cmd2 = Command::new(cargo_bin!("parkcard"));
    cmd2.env("PHONEPE_BYPASS", "true")
        .arg("--db-path")
        .arg(&db_path)
        .arg("replay")
        .arg(script2.path())
        .arg("--roster");

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    assert!(stdout2.contains("\"cardNumber\":\"0101\""));
    assert!(stdout2.contains(",0100,ACTIVE,FAMILY,15,0,15,"));
    assert!(stdout2.contains(",0101,ACTIVE,PREMIUM,15,0,15,"));
}
