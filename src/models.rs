use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    /// Income iff the amount is strictly positive; zero counts as an expense.
    pub fn from_amount(amount: f64) -> Self {
        if amount > 0.0 {
            Self::Income
        } else {
            Self::Expense
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl FromStr for TransactionType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(PipelineError::Validation(format!(
                "unknown transaction type '{other}'"
            ))),
        }
    }
}

/// Canonical record every source normalizes into.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub amount: f64,
    pub description: String,
    pub transaction_type: TransactionType,
    pub source: String,
}

/// `(date, amount bits, description)`. `-0.0` and `0.0` share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(NaiveDate, u64, String);

impl Transaction {
    pub fn new(date: NaiveDate, amount: f64, raw_description: &str, source: &str) -> Self {
        Self {
            date,
            amount,
            description: raw_description.trim().to_uppercase(),
            transaction_type: TransactionType::from_amount(amount),
            source: source.to_string(),
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        let amount = if self.amount == 0.0 { 0.0 } else { self.amount };
        DedupKey(self.date, amount.to_bits(), self.description.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedTransaction {
    pub transaction: Transaction,
    pub category: String,
}

/// A row as read back from the `transactions` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTransaction {
    pub id: i64,
    pub date: NaiveDate,
    pub amount: f64,
    pub description: Option<String>,
    pub transaction_type: TransactionType,
    pub source: String,
    pub category: String,
}

impl StoredTransaction {
    /// `YYYY-MM`, the grouping key for every monthly view.
    pub fn month(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }

    pub fn is_expense(&self) -> bool {
        self.transaction_type == TransactionType::Expense
    }

    pub fn is_income(&self) -> bool {
        self.transaction_type == TransactionType::Income
    }
}

/// Which tree of raw files and which database a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Synthetic,
    Real,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Real => "real",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "synthetic" => Ok(Self::Synthetic),
            "real" => Ok(Self::Real),
            _ => Err(PipelineError::UnknownDataset(s.to_string())),
        }
    }
}
