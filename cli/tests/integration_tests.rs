use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Configuration with one `shop` database stored next to the config file.
fn write_config(dir: &Path, version: u32) -> PathBuf {
    let yaml = format!(
        r#"settings:
  version: {version}
connections:
  - database_name: shop
    connection_string: shop.db
    is_master: true
"#
    );
    let path = dir.join("dbmap.yaml");
    fs::write(&path, yaml).expect("failed to write config");
    path
}

fn write_migration(dir: &Path, name: &str, sql: &str) {
    fs::create_dir_all(dir).expect("failed to create migrations dir");
    fs::write(dir.join(name), sql).expect("failed to write migration");
}

fn dbmap(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dbmap"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run dbmap")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp path is not UTF-8")
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

#[test]
fn status_reports_uninitialized_database() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 1);
    // A zero-length file is an empty SQLite database.
    fs::write(dir.path().join("shop.db"), b"").unwrap();

    let output = dbmap(&["status", "--config", path_arg(&config)]);

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("shop: version 0 (not initialized)"), "{stdout}");
}

#[test]
fn status_does_not_create_missing_database_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 1);

    let output = dbmap(&["status", "--config", path_arg(&config)]);

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("shop: version 0 (no database file at"), "{stdout}");
    assert!(!dir.path().join("shop.db").exists());
}

#[test]
fn status_fails_on_missing_config() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.yaml");

    let output = dbmap(&["status", "--config", path_arg(&missing)]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: Failed to load config"), "{stderr}");
}

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

#[test]
fn migrate_creates_brand_new_database() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 1);

    let output = dbmap(&["migrate", "--config", path_arg(&config)]);

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("shop: brand new -> version 1"), "{stdout}");
    assert!(dir.path().join("shop.db").exists());

    let status = dbmap(&["status", "--config", path_arg(&config)]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("shop: version 1 (up to date)"), "{stdout}");
}

#[test]
fn migrate_applies_scripts_in_version_order() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 1);
    assert!(dbmap(&["migrate", "--config", path_arg(&config)]).status.success());

    let scripts = dir.path().join("migrations");
    write_migration(
        &scripts,
        "shop.2-3.sql",
        "ALTER TABLE notes ADD COLUMN body TEXT;",
    );
    write_migration(
        &scripts,
        "shop.1-2.sql",
        "CREATE TABLE notes (id INTEGER PRIMARY KEY);",
    );
    let config = write_config(dir.path(), 3);

    let pending = dbmap(&["status", "--config", path_arg(&config)]);
    let stdout = String::from_utf8_lossy(&pending.stdout);
    assert!(stdout.contains("shop: version 1 (2 migration(s) pending)"), "{stdout}");

    let output = dbmap(&[
        "migrate",
        "--config",
        path_arg(&config),
        "--migrations",
        path_arg(&scripts),
    ]);

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("shop: needs migration -> version 3"), "{stdout}");
    assert!(stdout.contains("2 migration(s) applied"), "{stdout}");
}

#[test]
fn migrate_fails_when_a_step_is_missing() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 1);
    assert!(dbmap(&["migrate", "--config", path_arg(&config)]).status.success());

    let scripts = dir.path().join("migrations");
    write_migration(&scripts, "shop.2-3.sql", "CREATE TABLE notes (id INTEGER);");
    let config = write_config(dir.path(), 3);

    let output = dbmap(&[
        "migrate",
        "--config",
        path_arg(&config),
        "--migrations",
        path_arg(&scripts),
    ]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: Migration failed"), "{stderr}");
    assert!(stderr.contains("ERROR"), "{stderr}");
    assert!(stderr.contains("kind"), "{stderr}");

    let status = dbmap(&["status", "--config", path_arg(&config)]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("shop: version 1"), "{stdout}");
}

#[test]
fn migrate_rejects_brand_new_database_above_version_one() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 2);

    let output = dbmap(&["migrate", "--config", path_arg(&config)]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"), "{stderr}");
}

#[test]
fn migrate_rejects_misnamed_scripts() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), 1);
    let scripts = dir.path().join("migrations");
    write_migration(&scripts, "add-notes.sql", "SELECT 1;");

    let output = dbmap(&[
        "migrate",
        "--config",
        path_arg(&config),
        "--migrations",
        path_arg(&scripts),
    ]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not match"), "{stderr}");
}
