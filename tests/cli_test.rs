// CLI surface tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn write_config(temp_dir: &TempDir, extra: &str) -> std::path::PathBuf {
    let config_path = temp_dir.path().join("catalog-dr.toml");
    let log_dir = temp_dir.path().join("logs");
    let contents = format!(
        "[global]\nlog_directory = \"{}\"\n{}",
        log_dir.display(),
        extra
    );
    fs::write(&config_path, contents).unwrap();
    config_path
}

#[test]
fn test_validate_reports_counts() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        "[rules.daily]\nschedule = \"10 9 * * *\"\nretention_days = 30\n",
    );

    Command::cargo_bin("catalog-dr")
        .unwrap()
        .args(["--config"])
        .arg(&config_path)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Rules: 1"));
}

#[test]
fn test_invalid_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        "[rules.daily]\nschedule = \"not a cron\"\nretention_days = 30\n",
    );

    Command::cargo_bin("catalog-dr")
        .unwrap()
        .args(["--config"])
        .arg(&config_path)
        .arg("validate")
        .assert()
        .failure();
}

#[test]
fn test_missing_config_fails() {
    Command::cargo_bin("catalog-dr")
        .unwrap()
        .args(["--config", "/nonexistent/catalog-dr.toml", "validate"])
        .assert()
        .failure();
}

#[test]
fn test_status_shows_table_and_rules() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(
        &temp_dir,
        "[rules.daily]\nschedule = \"10 9 * * *\"\nretention_days = 30\n",
    );

    Command::cargo_bin("catalog-dr")
        .unwrap()
        .args(["--config"])
        .arg(&config_path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Table: Product"))
        .stdout(predicate::str::contains("daily"));
}

#[test]
fn test_invoke_routes_through_router() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = write_config(&temp_dir, "");

    // An unknown route surfaces the router's 404 and a nonzero exit.
    Command::cargo_bin("catalog-dr")
        .unwrap()
        .args(["--config"])
        .arg(&config_path)
        .args(["invoke", "--method", "GET", "--path", "/rateProduct"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not_found"));

    // A valid CRUD request succeeds end to end.
    Command::cargo_bin("catalog-dr")
        .unwrap()
        .args(["--config"])
        .arg(&config_path)
        .args([
            "invoke",
            "--method",
            "POST",
            "--path",
            "/addProduct",
            "--body",
            r#"{"product_id":"p1","product_title":"Widget","product_category":"tools"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Widget"));
}
