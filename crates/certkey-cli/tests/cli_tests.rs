use assert_cmd::Command;
use predicates::prelude::*;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_key(dir: &Path, name: &str) {
    let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
    let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
    fs::write(dir.join(format!("{name}.pem")), pem.as_bytes()).unwrap();
}

fn certkey(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("certkey").unwrap();
    cmd.env_remove("CERTKEY_RECOVERY_KEY")
        .arg("--config")
        .arg(root.join("config.json"))
        .arg("--keys")
        .arg(root.join("keys"));
    cmd
}

#[test]
fn create_then_open_prints_same_key() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("keys")).unwrap();
    write_key(&dir.path().join("keys"), "alice");
    let db = dir.path().join("vault.kdbx");

    let created = certkey(dir.path())
        .arg("create")
        .arg(&db)
        .write_stdin("1\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("RECOVERY KEY"))
        .get_output()
        .stdout
        .clone();
    let created = String::from_utf8(created).unwrap();
    assert_eq!(created.trim().len(), 256);

    let opened = certkey(dir.path())
        .arg("open")
        .arg(&db)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(opened).unwrap(), created);

    certkey(dir.path())
        .arg("inspect")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("salt: ").and(predicate::str::contains("cert: ")));
}

#[test]
fn recovery_key_from_environment_opens_without_metadata() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("keys")).unwrap();
    let db = dir.path().join("vault.kdbx");

    certkey(dir.path())
        .env("CERTKEY_RECOVERY_KEY", "00ff10")
        .arg("open")
        .arg(&db)
        .assert()
        .success()
        .stdout("00ff10\n")
        .stderr(predicate::str::contains("warning"));
}

#[test]
fn wrong_extension_is_rejected() {
    let dir = tempdir().unwrap();
    certkey(dir.path())
        .arg("open")
        .arg(dir.path().join("notes.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("wrong extension"));
}
