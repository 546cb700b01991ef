use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn finpipe(home: &Path, data_root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("finpipe").unwrap();
    cmd.env("HOME", home)
        .env("FINPIPE_DATA_ROOT", data_root)
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1");
    cmd
}

fn seed(data_root: &Path) {
    let raw = data_root.join("raw").join("synthetic");
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(
        raw.join("anz_2024.csv"),
        "01/03/2024,-45.30,woolworths perth\n02/03/2024,1000.00,SALARY ACME\n",
    )
    .unwrap();
    std::fs::write(
        raw.join("bank_b_2024.csv"),
        "Transaction Date,Narration,Debit,Credit\n\
         01/03/2024,WOOLWORTHS PERTH,45.30,\n\
         05/03/2024,NETFLIX.COM,15.99\n",
    )
    .unwrap();
    std::fs::write(
        data_root.join("category_rules.csv"),
        "pattern,category\nWOOLWORTHS,Groceries\nNETFLIX,Subscriptions\n",
    )
    .unwrap();
}

#[test]
fn run_then_report() {
    let home = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    seed(data.path());

    finpipe(home.path(), data.path())
        .args(["run", "synthetic"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validated"))
        .stdout(predicate::str::contains("Combined 3 transactions"))
        .stdout(predicate::str::contains("0 uncategorized"))
        .stdout(predicate::str::contains("By category"))
        .stdout(predicate::str::contains("Subscriptions"))
        .stdout(predicate::str::contains("2024-03-01 to 2024-03-05"));
    assert!(data.path().join("synthetic_finance.db").exists());
    assert!(data
        .path()
        .join("processed/synthetic/all_transactions_categorized.csv")
        .exists());

    finpipe(home.path(), data.path())
        .args(["report", "savings"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2024-03"))
        .stdout(predicate::str::contains("93.9%"));

    finpipe(home.path(), data.path())
        .args(["report", "merchants"])
        .assert()
        .success()
        .stdout(predicate::str::contains("WOOLWORTHS PERTH"));

    finpipe(home.path(), data.path())
        .args(["report", "all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Category Summary"))
        .stdout(predicate::str::contains("Cash Flow"));
}

#[test]
fn report_without_store_fails() {
    let home = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();

    finpipe(home.path(), data.path())
        .args(["report", "trends"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Database not found"));
}

#[test]
fn run_without_data_names_stage() {
    let home = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();

    finpipe(home.path(), data.path())
        .args(["run", "real"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Stage 'combine' failed"));
}

#[test]
fn unknown_dataset_rejected() {
    let home = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();

    finpipe(home.path(), data.path())
        .args(["run", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown dataset"));
}

#[test]
fn rules_test_reports_match() {
    let home = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    seed(data.path());

    finpipe(home.path(), data.path())
        .args(["rules", "test", "woolworths perth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Groceries"));

    finpipe(home.path(), data.path())
        .args(["rules", "test", "mystery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Uncategorized"));
}

#[test]
fn init_creates_layout() {
    let home = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let root = data.path().join("fin");

    Command::cargo_bin("finpipe")
        .unwrap()
        .env("HOME", home.path())
        .env_remove("FINPIPE_DATA_ROOT")
        .args(["--data-root", root.to_str().unwrap(), "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized finpipe"));

    assert!(root.join("raw/synthetic").is_dir());
    assert!(root.join("raw/real").is_dir());
    assert!(root.join("category_rules.csv").exists());
    assert!(home.path().join(".config/finpipe/settings.json").exists());

    Command::cargo_bin("finpipe")
        .unwrap()
        .env("HOME", home.path())
        .env_remove("FINPIPE_DATA_ROOT")
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing loaded yet"));
}
