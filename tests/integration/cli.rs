//! Binary-level checks driving the `oscup` executable.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn oscup() -> Command {
    Command::cargo_bin("oscup").unwrap()
}

#[test]
fn help_lists_the_subcommands() {
    oscup()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("check")
                .and(predicate::str::contains("upgrade"))
                .and(predicate::str::contains("status"))
                .and(predicate::str::contains("rollback"))
                .and(predicate::str::contains("migrate")),
        );
}

#[test]
fn status_on_a_fresh_root_reports_unknown_core_version() {
    let temp = TempDir::new().unwrap();
    oscup()
        .args(["--root", temp.path().to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("osclass: unknown")
                .and(predicate::str::contains("No plugins enabled")),
        );
}

#[test]
fn migrate_applies_the_shipped_schema_script() {
    let temp = TempDir::new().unwrap();
    let script_dir = temp.path().join("oc-includes/osclass/installer");
    std::fs::create_dir_all(&script_dir).unwrap();
    std::fs::write(
        script_dir.join("struct.sql"),
        "CREATE TABLE IF NOT EXISTS /*TABLE_PREFIX*/t_preference (\n\
           pk_s_name TEXT PRIMARY KEY,\n\
           s_value TEXT\n\
         );\n",
    )
    .unwrap();

    oscup()
        .args(["--root", temp.path().to_str().unwrap(), "migrate"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("1 statement(s): 1 succeeded, 0 failed")
                .and(predicate::str::contains("database schema is up to date")),
        );
    assert!(temp.path().join("oscup.db").exists());
}

#[test]
fn migrate_surfaces_failed_statements_and_respects_the_override() {
    let temp = TempDir::new().unwrap();
    let script_dir = temp.path().join("oc-includes/osclass/installer");
    std::fs::create_dir_all(&script_dir).unwrap();
    std::fs::write(
        script_dir.join("struct.sql"),
        "CREATE TABLE /*TABLE_PREFIX*/t_item (id INTEGER);\n\
         INSERT INTO missing_table VALUES (1);\n",
    )
    .unwrap();

    let root = temp.path().to_str().unwrap();
    oscup()
        .args(["--root", root, "migrate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing_table"));

    // The operator reviewed the failure and forces continuation.
    oscup()
        .args(["--root", root, "migrate", "--proceed-on-errors"])
        .assert()
        .success();
}

#[test]
fn rollback_without_a_journal_fails_with_a_clear_message() {
    let temp = TempDir::new().unwrap();
    oscup()
        .args(["--root", temp.path().to_str().unwrap(), "rollback"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to roll back"));
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    oscup().assert().failure().stderr(predicate::str::contains("Usage"));
}
