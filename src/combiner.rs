use std::collections::HashSet;

use log::info;

use crate::error::{PipelineError, Result};
use crate::models::Transaction;

/// Drops repeats of `(date, amount, description)`, keeping the first in input
/// order. Returns the survivors and how many were dropped.
pub fn dedupe(transactions: Vec<Transaction>) -> (Vec<Transaction>, usize) {
    let before = transactions.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<Transaction> = transactions
        .into_iter()
        .filter(|t| seen.insert(t.dedup_key()))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

#[derive(Debug)]
pub struct SourceCount {
    pub source: String,
    pub count: usize,
    pub net_total: f64,
}

#[derive(Debug)]
pub struct CombineResult {
    pub transactions: Vec<Transaction>,
    pub duplicates_removed: usize,
    pub by_source: Vec<SourceCount>,
}

/// Concatenates the per-source sets in the order given, stable-sorts by date
/// and removes cross-source duplicates.
pub fn combine(sources: Vec<Vec<Transaction>>) -> Result<CombineResult> {
    let mut all: Vec<Transaction> = sources.into_iter().flatten().collect();
    if all.is_empty() {
        return Err(PipelineError::NoData);
    }

    all.sort_by_key(|t| t.date);
    let (transactions, duplicates_removed) = dedupe(all);
    if duplicates_removed > 0 {
        info!("Removed {duplicates_removed} duplicate transactions across sources");
    }

    let mut by_source: Vec<SourceCount> = Vec::new();
    for t in &transactions {
        match by_source.iter_mut().find(|s| s.source == t.source) {
            Some(entry) => {
                entry.count += 1;
                entry.net_total += t.amount;
            }
            None => by_source.push(SourceCount {
                source: t.source.clone(),
                count: 1,
                net_total: t.amount,
            }),
        }
    }

    Ok(CombineResult {
        transactions,
        duplicates_removed,
        by_source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn txn(day: u32, amount: f64, desc: &str, source: &str) -> Transaction {
        Transaction::new(NaiveDate::from_ymd_opt(2024, 3, day).unwrap(), amount, desc, source)
    }

    #[test]
    fn test_same_triple_from_two_sources_collapses() {
        let a = vec![txn(1, -45.30, "WOOLWORTHS PERTH", "Bank_A")];
        let b = vec![txn(1, -45.30, "WOOLWORTHS PERTH", "Bank_B")];
        let result = combine(vec![a, b]).unwrap();
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].source, "Bank_A");
        assert_eq!(result.duplicates_removed, 1);
    }

    #[test]
    fn test_sorted_by_date_stable() {
        let a = vec![txn(5, -1.0, "A5", "ANZ"), txn(2, -1.0, "A2", "ANZ")];
        let b = vec![txn(2, -2.0, "B2", "Bankwest"), txn(1, -2.0, "B1", "Bankwest")];
        let result = combine(vec![a, b]).unwrap();
        let descs: Vec<_> = result
            .transactions
            .iter()
            .map(|t| t.description.as_str())
            .collect();
        assert_eq!(descs, vec!["B1", "A2", "B2", "A5"]);
    }

    #[test]
    fn test_first_seen_wins_after_date_sort() {
        // Insertion order breaks date ties.
        let a = vec![txn(3, -7.0, "TOLL", "ANZ")];
        let b = vec![txn(3, -7.0, "TOLL", "Bankwest")];
        let result = combine(vec![b, a]).unwrap();
        assert_eq!(result.transactions[0].source, "Bankwest");
    }

    #[test]
    fn test_empty_union_is_error() {
        let err = combine(vec![Vec::new(), Vec::new()]).unwrap_err();
        assert!(matches!(err, PipelineError::NoData));
        assert!(matches!(combine(Vec::new()), Err(PipelineError::NoData)));
    }

    #[test]
    fn test_missing_source_tolerated() {
        let a = vec![txn(1, 10.0, "INTEREST", "ANZ")];
        let result = combine(vec![a, Vec::new()]).unwrap();
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.by_source.len(), 1);
        assert_eq!(result.by_source[0].count, 1);
    }

    #[test]
    fn test_idempotent_on_deduped_input() {
        let a = vec![
            txn(1, -45.30, "WOOLWORTHS PERTH", "ANZ"),
            txn(1, -45.30, "WOOLWORTHS PERTH", "ANZ"),
            txn(2, 100.0, "REFUND", "ANZ"),
        ];
        let b = vec![txn(1, -3.0, "COFFEE", "Bankwest")];
        let once = combine(vec![a, b]).unwrap().transactions;
        let twice = combine(vec![once.clone()]).unwrap();
        assert_eq!(twice.transactions, once);
        assert_eq!(twice.duplicates_removed, 0);
    }

    #[test]
    fn test_by_source_totals() {
        let a = vec![txn(1, -10.0, "X", "ANZ"), txn(2, 25.0, "Y", "ANZ")];
        let b = vec![txn(1, -5.0, "Z", "Bankwest")];
        let result = combine(vec![a, b]).unwrap();
        let anz = result.by_source.iter().find(|s| s.source == "ANZ").unwrap();
        assert_eq!(anz.count, 2);
        assert_eq!(anz.net_total, 15.0);
    }
}
