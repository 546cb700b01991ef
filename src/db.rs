use std::path::Path;

use chrono::NaiveDate;
use log::{debug, info};
use rusqlite::{params, Connection};

use crate::error::{PipelineError, Result};
use crate::models::{CategorizedTransaction, StoredTransaction, TransactionType};

pub const SCHEMA: &str = "
CREATE TABLE transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    amount REAL NOT NULL,
    description TEXT,
    transaction_type TEXT NOT NULL,
    source TEXT NOT NULL,
    category TEXT NOT NULL
);
";

/// Largest accepted gap between the input and stored amount totals.
pub const SUM_TOLERANCE: f64 = 0.01;

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn table_exists(conn: &Connection) -> Result<bool> {
    let mut stmt = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'transactions'")?;
    Ok(stmt.exists([])?)
}

/// Opens a loaded store for reading; a missing file or table is an error.
pub fn open_store(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        return Err(PipelineError::MissingStore(db_path.to_path_buf()));
    }
    let conn = Connection::open(db_path)?;
    if !table_exists(&conn)? {
        return Err(PipelineError::MissingStore(db_path.to_path_buf()));
    }
    Ok(conn)
}

// ---------------------------------------------------------------------------
// Full-replace load
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CategoryTotal {
    pub category: String,
    pub count: i64,
    pub total: f64,
}

#[derive(Debug)]
pub struct LoadReport {
    pub row_count: usize,
    pub amount_total: f64,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub categories: Vec<CategoryTotal>,
}

pub fn validate_load(
    expected_rows: usize,
    expected_sum: f64,
    stored_rows: i64,
    stored_sum: f64,
) -> Result<()> {
    if stored_rows != expected_rows as i64 {
        return Err(PipelineError::Validation(format!(
            "row count mismatch: input={expected_rows}, stored={stored_rows}"
        )));
    }
    if (stored_sum - expected_sum).abs() >= SUM_TOLERANCE {
        return Err(PipelineError::Validation(format!(
            "amount total mismatch: input={expected_sum:.2}, stored={stored_sum:.2}"
        )));
    }
    Ok(())
}

/// Drops and rebuilds `transactions` in one SQLite transaction. Any insert or
/// validation failure rolls back, leaving the previous table untouched.
pub fn load_transactions(
    conn: &mut Connection,
    rows: &[CategorizedTransaction],
) -> Result<LoadReport> {
    let tx = conn.transaction()?;
    replace_table(&tx, rows)?;
    finish_load(tx, rows)
}

/// Recreates the table inside `tx` and inserts `rows`. Nothing is visible
/// outside the transaction until [`finish_load`] commits.
pub fn replace_table(
    tx: &rusqlite::Transaction<'_>,
    rows: &[CategorizedTransaction],
) -> Result<()> {
    tx.execute_batch("DROP TABLE IF EXISTS transactions;")?;
    tx.execute_batch(SCHEMA)?;
    debug!("Created transactions table");

    let mut stmt = tx.prepare(
        "INSERT INTO transactions \
         (date, amount, description, transaction_type, source, category) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for row in rows {
        let t = &row.transaction;
        stmt.execute(params![
            t.date,
            t.amount,
            t.description,
            t.transaction_type.as_str(),
            t.source,
            row.category,
        ])?;
    }
    Ok(())
}

/// Checks the staged table against `rows` and commits. On mismatch `tx` is
/// dropped, which rolls the whole load back.
pub fn finish_load(
    tx: rusqlite::Transaction<'_>,
    rows: &[CategorizedTransaction],
) -> Result<LoadReport> {
    let expected_sum: f64 = rows.iter().map(|r| r.transaction.amount).sum();
    let (stored_rows, stored_sum): (i64, f64) = tx.query_row(
        "SELECT COUNT(*), COALESCE(SUM(amount), 0.0) FROM transactions",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    validate_load(rows.len(), expected_sum, stored_rows, stored_sum)?;

    let report = summarize(&tx)?;
    tx.commit()?;
    info!(
        "Loaded {} rows, amount total {:.2}",
        report.row_count, report.amount_total
    );
    Ok(report)
}

pub fn summarize(conn: &Connection) -> Result<LoadReport> {
    type Totals = (i64, f64, Option<NaiveDate>, Option<NaiveDate>);
    let (row_count, amount_total, min_date, max_date): Totals = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(amount), 0.0), MIN(date), MAX(date) FROM transactions",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) AS transaction_count, SUM(amount) AS total_amount \
         FROM transactions GROUP BY category ORDER BY total_amount ASC, category",
    )?;
    let categories = stmt
        .query_map([], |row| {
            Ok(CategoryTotal {
                category: row.get(0)?,
                count: row.get(1)?,
                total: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(LoadReport {
        row_count: row_count as usize,
        amount_total,
        date_range: min_date.zip(max_date),
        categories,
    })
}

/// Every stored row in insertion (id) order.
pub fn read_transactions(conn: &Connection) -> Result<Vec<StoredTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, amount, description, transaction_type, source, category \
         FROM transactions ORDER BY id",
    )?;
    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, NaiveDate>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, date, amount, description, kind, source, category)| {
            Ok(StoredTransaction {
                id,
                date,
                amount,
                description,
                transaction_type: kind.parse::<TransactionType>()?,
                source,
                category,
            })
        })
        .collect()
}
