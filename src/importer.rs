use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::combiner::dedupe;
use crate::error::{PipelineError, Result};
use crate::models::{Transaction, TransactionType};
use crate::settings::DateWindow;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strips thousands separators, quotes and a leading `$`; `(12.50)` is negative.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let value = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => -inner.trim().parse::<f64>().ok()?,
        None => s.parse::<f64>().ok()?,
    };
    value.is_finite().then_some(value)
}

pub fn parse_date_dmy(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").ok()
}

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Source kinds: enum dispatch over the per-bank raw schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// No header; `date, amount, description`.
    Positional,
    /// Header row with `Transaction Date`, `Narration`, `Debit`, `Credit`.
    DebitCredit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Anz,
    Bankwest,
    BankA,
    BankB,
}

impl SourceKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Anz => "anz",
            Self::Bankwest => "bankwest",
            Self::BankA => "bank_a",
            Self::BankB => "bank_b",
        }
    }

    /// Value written into `Transaction::source`.
    pub fn source_id(&self) -> &'static str {
        match self {
            Self::Anz => "ANZ",
            Self::Bankwest => "Bankwest",
            Self::BankA => "Bank_A",
            Self::BankB => "Bank_B",
        }
    }

    pub fn schema(&self) -> Schema {
        match self {
            Self::Anz | Self::BankA => Schema::Positional,
            Self::Bankwest | Self::BankB => Schema::DebitCredit,
        }
    }

    /// Raw files belong to a source when their name starts with its key.
    pub fn owns_file(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        lower.starts_with(self.key()) && lower.ends_with(".csv")
    }

    pub fn parse(&self, file_path: &Path) -> Result<Vec<Transaction>> {
        match self.schema() {
            Schema::Positional => parse_positional(file_path, self.source_id()),
            Schema::DebitCredit => parse_debit_credit(file_path, self.source_id()),
        }
    }
}

pub const ALL_SOURCES: &[SourceKind] = &[
    SourceKind::Anz,
    SourceKind::Bankwest,
    SourceKind::BankA,
    SourceKind::BankB,
];

pub fn get_by_key(key: &str) -> Option<SourceKind> {
    ALL_SOURCES.iter().find(|s| s.key() == key).copied()
}

/// Sorted list of the source's files in `dir`. A missing directory is empty.
pub fn find_source_files(dir: &Path, kind: SourceKind) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let owned = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| kind.owns_file(n));
        if owned && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// normalize_source
// ---------------------------------------------------------------------------

/// Count and signed sum of one side (income or expense) of a batch.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FlowTotal {
    pub count: usize,
    pub total: f64,
}

#[derive(Debug)]
pub struct SourceBatch {
    pub transactions: Vec<Transaction>,
    pub files: Vec<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
    pub rows_read: usize,
    pub duplicates_removed: usize,
    pub filtered_out: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub income: FlowTotal,
    pub expense: FlowTotal,
}

fn flow_totals(transactions: &[Transaction]) -> (FlowTotal, FlowTotal) {
    let mut income = FlowTotal::default();
    let mut expense = FlowTotal::default();
    for t in transactions {
        let side = match t.transaction_type {
            TransactionType::Income => &mut income,
            TransactionType::Expense => &mut expense,
        };
        side.count += 1;
        side.total += t.amount;
    }
    (income, expense)
}

pub fn normalize_source(
    kind: SourceKind,
    raw_dir: &Path,
    window: Option<DateWindow>,
) -> Result<Option<SourceBatch>> {
    let files = find_source_files(raw_dir, kind)?;
    normalize_files(kind, &files, window)
}

/// Parse, dedupe and window-filter one source. `Ok(None)` when there are no files.
pub fn normalize_files(
    kind: SourceKind,
    files: &[PathBuf],
    window: Option<DateWindow>,
) -> Result<Option<SourceBatch>> {
    if files.is_empty() {
        return Ok(None);
    }

    let mut seen_checksums = HashSet::new();
    let mut used = Vec::new();
    let mut skipped_files = Vec::new();
    let mut rows = Vec::new();

    for file in files {
        let checksum = compute_checksum(file)?;
        if !seen_checksums.insert(checksum) {
            warn!(
                "{}: identical to an earlier {} file, skipping",
                file.display(),
                kind.source_id()
            );
            skipped_files.push(file.clone());
            continue;
        }
        let parsed = kind.parse(file)?;
        debug!("{}: {} rows", file.display(), parsed.len());
        rows.extend(parsed);
        used.push(file.clone());
    }

    let rows_read = rows.len();
    let (deduped, duplicates_removed) = dedupe(rows);
    if duplicates_removed > 0 {
        info!("{}: removed {duplicates_removed} duplicate transactions", kind.source_id());
    }

    let before_filter = deduped.len();
    let transactions: Vec<Transaction> = match window {
        Some(w) => deduped.into_iter().filter(|t| w.contains(t.date)).collect(),
        None => deduped,
    };
    let filtered_out = before_filter - transactions.len();
    if let Some(w) = window.filter(|_| filtered_out > 0) {
        info!(
            "{}: filtered out {filtered_out} transactions outside {} to {}",
            kind.source_id(),
            w.start,
            w.end
        );
    }

    let date_range = transactions
        .iter()
        .map(|t| t.date)
        .min()
        .zip(transactions.iter().map(|t| t.date).max());
    let (income, expense) = flow_totals(&transactions);
    if let Some((first, last)) = date_range {
        info!(
            "{}: {} transactions from {first} to {last}, income {} ({:.2}), expenses {} ({:.2})",
            kind.source_id(),
            transactions.len(),
            income.count,
            income.total,
            expense.count,
            expense.total
        );
    }

    Ok(Some(SourceBatch {
        transactions,
        files: used,
        skipped_files,
        rows_read,
        duplicates_removed,
        filtered_out,
        date_range,
        income,
        expense,
    }))
}

// ---------------------------------------------------------------------------
// Positional parser (ANZ, Bank_A)
// ---------------------------------------------------------------------------

fn parse_positional(file_path: &Path, source: &str) -> Result<Vec<Transaction>> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let mut rows = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| PipelineError::parse(file_path, e.to_string()))?;
        let line = line_of(&record);
        if record.len() != 3 {
            return Err(PipelineError::parse(
                file_path,
                format!("line {line}: expected 3 columns, found {}", record.len()),
            ));
        }
        let date = parse_date_dmy(&record[0]).ok_or_else(|| {
            PipelineError::parse(file_path, format!("line {line}: invalid date '{}'", &record[0]))
        })?;
        let amount = parse_amount(&record[1]).ok_or_else(|| {
            PipelineError::parse(file_path, format!("line {line}: invalid amount '{}'", &record[1]))
        })?;
        rows.push(Transaction::new(date, amount, &record[2], source));
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Debit/credit parser (Bankwest, Bank_B)
// ---------------------------------------------------------------------------

struct DebitCreditColumns {
    date: usize,
    narration: usize,
    debit: usize,
    credit: usize,
}

impl DebitCreditColumns {
    fn from_headers(headers: &csv::StringRecord, file_path: &Path) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| PipelineError::parse(file_path, format!("missing column '{name}'")))
        };
        Ok(Self {
            date: find("Transaction Date")?,
            narration: find("Narration")?,
            debit: find("Debit")?,
            credit: find("Credit")?,
        })
    }

    /// Debit and Credit are often the trailing columns and may be left off
    /// entirely when empty; only date and narration must be present.
    fn min_len(&self) -> usize {
        self.date.max(self.narration) + 1
    }
}

fn parse_debit_credit(file_path: &Path, source: &str) -> Result<Vec<Transaction>> {
    let file = std::fs::File::open(file_path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let headers = rdr
        .headers()
        .map_err(|e| PipelineError::parse(file_path, e.to_string()))?
        .clone();
    let cols = DebitCreditColumns::from_headers(&headers, file_path)?;
    let mut rows = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| PipelineError::parse(file_path, e.to_string()))?;
        let line = line_of(&record);
        if record.len() < cols.min_len() {
            return Err(PipelineError::parse(
                file_path,
                format!(
                    "line {line}: expected at least {} columns, found {}",
                    cols.min_len(),
                    record.len()
                ),
            ));
        }
        let date = parse_date_dmy(&record[cols.date]).ok_or_else(|| {
            PipelineError::parse(
                file_path,
                format!("line {line}: invalid date '{}'", &record[cols.date]),
            )
        })?;

        let side = |idx: usize| -> Result<Option<f64>> {
            let raw = record.get(idx).unwrap_or("").trim();
            if raw.is_empty() {
                return Ok(None);
            }
            parse_amount(raw).map(Some).ok_or_else(|| {
                PipelineError::parse(file_path, format!("line {line}: invalid amount '{raw}'"))
            })
        };
        // Some exports sign their debits, some don't.
        let amount = match (side(cols.debit)?, side(cols.credit)?) {
            (Some(_), Some(_)) => {
                return Err(PipelineError::parse(
                    file_path,
                    format!("line {line}: both Debit and Credit are populated"),
                ));
            }
            (Some(debit), None) => -debit.abs(),
            (None, Some(credit)) => credit.abs(),
            (None, None) => 0.0,
        };

        rows.push(Transaction::new(date, amount, &record[cols.narration], source));
    }
    Ok(rows)
}
