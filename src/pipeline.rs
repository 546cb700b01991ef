//! End-to-end run: normalize -> combine -> categorize -> load.
//!
//! Stages execute strictly in order and the first failure halts the run,
//! wrapped in [`PipelineError::Stage`] naming where it stopped.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;

use crate::categorizer::{categorize, categorize_stats, load_rules, CategorizeStats};
use crate::combiner::{combine, SourceCount};
use crate::db::{get_connection, load_transactions, LoadReport};
use crate::error::{PipelineError, Result, Stage};
use crate::importer::{get_by_key, normalize_source, FlowTotal, ALL_SOURCES};
use crate::models::{CategorizedTransaction, Dataset, Transaction, TransactionType};
use crate::settings::Settings;

/// Rows shown in the "top uncategorized" table after a run.
pub const TOP_UNCATEGORIZED: usize = 10;

#[derive(Debug)]
pub struct SourceOutcome {
    pub source_id: &'static str,
    pub files: usize,
    pub skipped_files: usize,
    pub rows_read: usize,
    pub duplicates_removed: usize,
    pub filtered_out: usize,
    pub kept: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub income: FlowTotal,
    pub expense: FlowTotal,
}

#[derive(Debug)]
pub struct PipelineReport {
    pub dataset: Dataset,
    pub sources: Vec<SourceOutcome>,
    pub missing_sources: Vec<&'static str>,
    pub combined_rows: usize,
    pub cross_source_duplicates: usize,
    pub by_source: Vec<SourceCount>,
    pub stats: CategorizeStats,
    pub rule_count: usize,
    pub load: LoadReport,
    pub db_path: PathBuf,
    pub processed_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct ProcessedRow<'a> {
    date: NaiveDate,
    amount: f64,
    description: &'a str,
    transaction_type: TransactionType,
    source: &'a str,
    category: &'a str,
}

impl<'a> From<&'a CategorizedTransaction> for ProcessedRow<'a> {
    fn from(row: &'a CategorizedTransaction) -> Self {
        let t = &row.transaction;
        Self {
            date: t.date,
            amount: t.amount,
            description: &t.description,
            transaction_type: t.transaction_type,
            source: &t.source,
            category: &row.category,
        }
    }
}

fn write_csv<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn run_pipeline(settings: &Settings, dataset: Dataset) -> Result<PipelineReport> {
    let raw_dir = settings.raw_dir(dataset);
    let processed_dir = settings
        .write_processed
        .then(|| settings.processed_dir(dataset));
    info!("Running {dataset} pipeline over {}", raw_dir.display());
    for key in settings
        .windowed_sources
        .iter()
        .filter(|k| get_by_key(k).is_none())
    {
        warn!("Date window configured for unknown source '{key}'");
    }

    // ---- normalize
    let mut sources = Vec::new();
    let mut missing_sources = Vec::new();
    let mut per_source: Vec<Vec<Transaction>> = Vec::new();

    for &kind in ALL_SOURCES {
        let window = settings.window_for(kind.key());
        let batch =
            normalize_source(kind, &raw_dir, window).map_err(|e| e.at(Stage::Normalize))?;
        let Some(batch) = batch else {
            warn!(
                "No {} files in {}, skipping source",
                kind.source_id(),
                raw_dir.display()
            );
            missing_sources.push(kind.source_id());
            continue;
        };
        if let Some(dir) = &processed_dir {
            std::fs::create_dir_all(dir)
                .map_err(|e| PipelineError::from(e).at(Stage::Normalize))?;
            let path = dir.join(format!("{}_clean.csv", kind.key()));
            write_csv(&path, &batch.transactions).map_err(|e| e.at(Stage::Normalize))?;
        }
        sources.push(SourceOutcome {
            source_id: kind.source_id(),
            files: batch.files.len(),
            skipped_files: batch.skipped_files.len(),
            rows_read: batch.rows_read,
            duplicates_removed: batch.duplicates_removed,
            filtered_out: batch.filtered_out,
            kept: batch.transactions.len(),
            date_range: batch.date_range,
            income: batch.income,
            expense: batch.expense,
        });
        per_source.push(batch.transactions);
    }

    // ---- combine
    let combined = combine(per_source).map_err(|e| e.at(Stage::Combine))?;
    info!(
        "Combined {} transactions ({} cross-source duplicates removed)",
        combined.transactions.len(),
        combined.duplicates_removed
    );
    if let Some(dir) = &processed_dir {
        write_csv(&dir.join("all_transactions_clean.csv"), &combined.transactions)
            .map_err(|e| e.at(Stage::Combine))?;
    }
    let combined_rows = combined.transactions.len();

    // ---- categorize
    let rules_path = settings.rules_path();
    let rules = load_rules(&rules_path).map_err(|e| e.at(Stage::Categorize))?;
    if rules.is_empty() {
        warn!(
            "{} has no rules; every transaction falls back to Income or Uncategorized",
            rules_path.display()
        );
    }
    let categorized = categorize(combined.transactions, &rules);
    let stats = categorize_stats(&categorized, TOP_UNCATEGORIZED);
    info!(
        "Categorized {}/{} transactions ({:.1}%) with {} rules",
        stats.categorized,
        stats.total,
        stats.categorized_pct(),
        rules.len()
    );
    if let Some(dir) = &processed_dir {
        write_csv(
            &dir.join("all_transactions_categorized.csv"),
            categorized.iter().map(ProcessedRow::from),
        )
        .map_err(|e| e.at(Stage::Categorize))?;
    }

    // ---- load
    let db_path = settings.db_path(dataset);
    let mut conn = get_connection(&db_path).map_err(|e| e.at(Stage::Load))?;
    let load = load_transactions(&mut conn, &categorized).map_err(|e| e.at(Stage::Load))?;

    Ok(PipelineReport {
        dataset,
        sources,
        missing_sources,
        combined_rows,
        cross_source_duplicates: combined.duplicates_removed,
        by_source: combined.by_source,
        stats,
        rule_count: rules.len(),
        load,
        db_path,
        processed_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_store, read_transactions};

    const RULES: &str =
        "pattern,category\nWOOLWORTHS,Groceries\nNETFLIX,Subscriptions\nTRANSFER,Transfer\n";

    fn setup() -> (tempfile::TempDir, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            data_root: dir.path().to_string_lossy().to_string(),
            ..Settings::default()
        };
        std::fs::create_dir_all(settings.raw_dir(Dataset::Synthetic)).unwrap();
        std::fs::write(settings.rules_path(), RULES).unwrap();
        (dir, settings)
    }

    fn raw(settings: &Settings, name: &str, content: &str) {
        let path = settings.raw_dir(Dataset::Synthetic).join(name);
        std::fs::write(path, content).unwrap();
    }

    fn seed_all(settings: &Settings) {
        raw(
            settings,
            "anz_2024.csv",
            "01/03/2024,-45.30,woolworths perth\n02/03/2024,2500.00,SALARY ACME\n",
        );
        raw(
            settings,
            "bankwest_2024.csv",
            "Transaction Date,Narration,Debit,Credit\n\
             05/03/2024,NETFLIX.COM,15.99,\n\
             06/03/2024,TRANSFER TO SAVINGS,500.00,\n",
        );
        raw(
            settings,
            "bank_a_2024.csv",
            "01/03/2024,-45.30,WOOLWORTHS PERTH\n15/06/2023,-10.00,OLD ROW\n",
        );
        raw(
            settings,
            "bank_b_2024.csv",
            "Transaction Date,Narration,Debit,Credit\n\
             10/03/2024,,,\n\
             11/03/2024,MYSTERY SHOP,-20.00,\n",
        );
    }

    #[test]
    fn test_full_run() {
        let (_dir, settings) = setup();
        seed_all(&settings);
        let report = run_pipeline(&settings, Dataset::Synthetic).unwrap();

        assert!(report.missing_sources.is_empty());
        let bank_a = &report.sources[2];
        assert_eq!(bank_a.source_id, "Bank_A");
        assert_eq!(bank_a.filtered_out, 1);
        let anz = &report.sources[0];
        assert_eq!(anz.source_id, "ANZ");
        let first = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(anz.date_range, Some((first, last)));
        assert_eq!(anz.income.count, 1);
        assert!((anz.income.total - 2500.0).abs() < 1e-9);
        assert_eq!(anz.expense.count, 1);
        assert!((anz.expense.total + 45.3).abs() < 1e-9);
        assert_eq!(report.cross_source_duplicates, 1);
        assert_eq!(report.combined_rows, 6);
        assert_eq!(report.load.row_count, 6);

        let conn = open_store(&report.db_path).unwrap();
        let stored = read_transactions(&conn).unwrap();
        assert_eq!(stored.len(), 6);
        let woolies: Vec<_> = stored
            .iter()
            .filter(|r| r.description.as_deref() == Some("WOOLWORTHS PERTH"))
            .collect();
        assert_eq!(woolies.len(), 1);
        assert_eq!(woolies[0].source, "ANZ");
        assert_eq!(woolies[0].category, "Groceries");
        assert!(stored.iter().any(|r| r.category == "Income" && r.amount == 2500.0));
        assert!(stored.iter().any(|r| r.category == "Transfer" && r.amount == -500.0));
        assert!(stored
            .iter()
            .any(|r| r.description.as_deref() == Some("") && r.amount == 0.0));
        assert!(stored.windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[test]
    fn test_processed_snapshots_written() {
        let (_dir, settings) = setup();
        seed_all(&settings);
        let report = run_pipeline(&settings, Dataset::Synthetic).unwrap();
        let dir = report.processed_dir.unwrap();
        for name in [
            "anz_clean.csv",
            "bankwest_clean.csv",
            "bank_a_clean.csv",
            "bank_b_clean.csv",
            "all_transactions_clean.csv",
            "all_transactions_categorized.csv",
        ] {
            assert!(dir.join(name).exists(), "missing {name}");
        }
        let content =
            std::fs::read_to_string(dir.join("all_transactions_categorized.csv")).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(
            header,
            "date,amount,description,transaction_type,source,category"
        );
        assert!(content.contains("2024-03-01,-45.3,WOOLWORTHS PERTH,expense,ANZ,Groceries"));
    }

    #[test]
    fn test_snapshots_can_be_disabled() {
        let (_dir, mut settings) = setup();
        settings.write_processed = false;
        seed_all(&settings);
        let report = run_pipeline(&settings, Dataset::Synthetic).unwrap();
        assert!(report.processed_dir.is_none());
        assert!(!settings.processed_dir(Dataset::Synthetic).exists());
    }

    #[test]
    fn test_missing_sources_tolerated() {
        let (_dir, settings) = setup();
        raw(&settings, "anz_2024.csv", "01/03/2024,-45.30,WOOLWORTHS\n");
        let report = run_pipeline(&settings, Dataset::Synthetic).unwrap();
        assert_eq!(report.missing_sources, vec!["Bankwest", "Bank_A", "Bank_B"]);
        assert_eq!(report.load.row_count, 1);
    }

    #[test]
    fn test_no_data_fails_at_combine() {
        let (_dir, settings) = setup();
        let err = run_pipeline(&settings, Dataset::Synthetic).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: Stage::Combine,
                ..
            }
        ));
        assert!(!settings.db_path(Dataset::Synthetic).exists());
    }

    #[test]
    fn test_parse_failure_fails_at_normalize() {
        let (_dir, settings) = setup();
        raw(&settings, "anz_2024.csv", "2024-03-01,-45.30,BAD DATE\n");
        let err = run_pipeline(&settings, Dataset::Synthetic).unwrap_err();
        assert!(err.to_string().starts_with("Stage 'normalize' failed"), "got: {err}");
        assert!(err.to_string().contains("anz_2024.csv"));
    }

    #[test]
    fn test_bad_rules_fail_at_categorize_and_keep_store() {
        let (_dir, settings) = setup();
        seed_all(&settings);
        run_pipeline(&settings, Dataset::Synthetic).unwrap();

        std::fs::write(settings.rules_path(), "match,cat\nX,Y\n").unwrap();
        let err = run_pipeline(&settings, Dataset::Synthetic).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: Stage::Categorize,
                ..
            }
        ));
        let conn = open_store(&settings.db_path(Dataset::Synthetic)).unwrap();
        assert_eq!(read_transactions(&conn).unwrap().len(), 6);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let (_dir, settings) = setup();
        seed_all(&settings);
        let db_path = settings.db_path(Dataset::Synthetic);
        run_pipeline(&settings, Dataset::Synthetic).unwrap();
        let first = read_transactions(&open_store(&db_path).unwrap()).unwrap();
        run_pipeline(&settings, Dataset::Synthetic).unwrap();
        let second = read_transactions(&open_store(&db_path).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_datasets_are_isolated() {
        let (_dir, settings) = setup();
        seed_all(&settings);
        run_pipeline(&settings, Dataset::Synthetic).unwrap();
        let err = run_pipeline(&settings, Dataset::Real).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: Stage::Combine,
                ..
            }
        ));
        assert!(settings.db_path(Dataset::Synthetic).exists());
        assert!(!settings.db_path(Dataset::Real).exists());
    }
}
