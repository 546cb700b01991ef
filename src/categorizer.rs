use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::models::{CategorizedTransaction, Transaction, TransactionType};

pub const INCOME: &str = "Income";
pub const UNCATEGORIZED: &str = "Uncategorized";
pub const TRANSFER: &str = "Transfer";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryRule {
    pub pattern: String,
    pub category: String,
}

/// Maps a description to a rule category. Implementations must be
/// deterministic; `None` means no rule applies.
pub trait CategoryMatcher {
    fn match_category(&self, description: &str) -> Option<&str>;
}

/// Ordered rules scanned linearly, first match wins.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
    patterns_upper: Vec<String>,
}

impl RuleSet {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let patterns_upper = rules.iter().map(|r| r.pattern.to_uppercase()).collect();
        Self {
            rules,
            patterns_upper,
        }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Position of the first matching rule.
    pub fn first_match(&self, description: &str) -> Option<usize> {
        let desc_upper = description.to_uppercase();
        self.patterns_upper
            .iter()
            .position(|pat| desc_upper.contains(pat.as_str()))
    }
}

impl CategoryMatcher for RuleSet {
    fn match_category(&self, description: &str) -> Option<&str> {
        self.first_match(description)
            .map(|i| self.rules[i].category.as_str())
    }
}

/// Reads a rules CSV whose header is exactly `pattern,category`.
pub fn load_rules(path: &Path) -> Result<RuleSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| PipelineError::parse(path, e.to_string()))?;

    let headers = rdr
        .headers()
        .map_err(|e| PipelineError::parse(path, e.to_string()))?;
    if headers.len() != 2 || &headers[0] != "pattern" || &headers[1] != "category" {
        return Err(PipelineError::parse(
            path,
            format!(
                "expected header 'pattern,category', found '{}'",
                headers.iter().collect::<Vec<_>>().join(",")
            ),
        ));
    }

    let mut rules = Vec::new();
    for result in rdr.deserialize::<CategoryRule>() {
        let rule = result.map_err(|e| PipelineError::parse(path, e.to_string()))?;
        if rule.pattern.is_empty() || rule.category.is_empty() {
            return Err(PipelineError::parse(
                path,
                format!("rule {}: pattern and category must not be blank", rules.len() + 1),
            ));
        }
        rules.push(rule);
    }
    Ok(RuleSet::new(rules))
}

/// Rule category, or the `Income`/`Uncategorized` fallback.
pub fn assign_category<M: CategoryMatcher + ?Sized>(txn: &Transaction, matcher: &M) -> String {
    match matcher.match_category(&txn.description) {
        Some(category) => category.to_string(),
        None if txn.transaction_type == TransactionType::Income => INCOME.to_string(),
        None => UNCATEGORIZED.to_string(),
    }
}

pub fn categorize<M: CategoryMatcher + ?Sized>(
    transactions: Vec<Transaction>,
    matcher: &M,
) -> Vec<CategorizedTransaction> {
    transactions
        .into_iter()
        .map(|transaction| {
            let category = assign_category(&transaction, matcher);
            CategorizedTransaction {
                transaction,
                category,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Statistics (reporting only)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SourceRate {
    pub source: String,
    pub categorized: usize,
    pub total: usize,
}

impl SourceRate {
    pub fn rate_pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.categorized as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug)]
pub struct MerchantCount {
    pub description: String,
    pub count: usize,
    pub total: f64,
}

#[derive(Debug)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
    pub total: f64,
}

#[derive(Debug)]
pub struct CategorizeStats {
    pub total: usize,
    pub categorized: usize,
    pub uncategorized: usize,
    pub by_source: Vec<SourceRate>,
    pub by_category: Vec<CategoryCount>,
    pub top_uncategorized: Vec<MerchantCount>,
    /// Income and expense sums with `Transfer` rows left out.
    pub real_income: f64,
    pub real_expense: f64,
}

impl CategorizeStats {
    pub fn categorized_pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.categorized as f64 / self.total as f64 * 100.0
        }
    }
}

/// Frequency tables keep first-appearance order among equal counts.
pub fn categorize_stats(rows: &[CategorizedTransaction], top_n: usize) -> CategorizeStats {
    let mut by_source: Vec<SourceRate> = Vec::new();
    let mut by_category: Vec<CategoryCount> = Vec::new();
    let mut uncategorized: Vec<MerchantCount> = Vec::new();
    let mut real_income = 0.0;
    let mut real_expense = 0.0;

    for row in rows {
        let t = &row.transaction;
        let is_uncategorized = row.category == UNCATEGORIZED;

        let idx = match by_source.iter().position(|s| s.source == t.source) {
            Some(i) => i,
            None => {
                by_source.push(SourceRate {
                    source: t.source.clone(),
                    categorized: 0,
                    total: 0,
                });
                by_source.len() - 1
            }
        };
        let src = &mut by_source[idx];
        src.total += 1;
        if !is_uncategorized {
            src.categorized += 1;
        }

        match by_category.iter_mut().find(|c| c.category == row.category) {
            Some(c) => {
                c.count += 1;
                c.total += t.amount;
            }
            None => by_category.push(CategoryCount {
                category: row.category.clone(),
                count: 1,
                total: t.amount,
            }),
        }

        if is_uncategorized {
            match uncategorized.iter_mut().find(|m| m.description == t.description) {
                Some(m) => {
                    m.count += 1;
                    m.total += t.amount;
                }
                None => uncategorized.push(MerchantCount {
                    description: t.description.clone(),
                    count: 1,
                    total: t.amount,
                }),
            }
        }

        if row.category != TRANSFER {
            match t.transaction_type {
                TransactionType::Income => real_income += t.amount,
                TransactionType::Expense => real_expense += t.amount,
            }
        }
    }

    by_category.sort_by(|a, b| b.count.cmp(&a.count));
    uncategorized.sort_by(|a, b| b.count.cmp(&a.count));
    uncategorized.truncate(top_n);

    let uncategorized_count = rows.iter().filter(|r| r.category == UNCATEGORIZED).count();
    CategorizeStats {
        total: rows.len(),
        categorized: rows.len() - uncategorized_count,
        uncategorized: uncategorized_count,
        by_source,
        by_category,
        top_uncategorized: uncategorized,
        real_income,
        real_expense,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn txn(amount: f64, desc: &str, source: &str) -> Transaction {
        Transaction::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), amount, desc, source)
    }

    fn rule(pattern: &str, category: &str) -> CategoryRule {
        CategoryRule {
            pattern: pattern.to_string(),
            category: category.to_string(),
        }
    }

    #[test]
    fn test_woolworths_example() {
        let rules = RuleSet::new(vec![rule("WOOLWORTHS", "Groceries")]);
        let out = categorize(vec![txn(-45.30, "woolworths perth", "Bank_A")], &rules);
        assert_eq!(out[0].category, "Groceries");
    }

    #[test]
    fn test_case_insensitive_pattern() {
        let rules = RuleSet::new(vec![rule("netflix", "Subscriptions")]);
        assert_eq!(rules.match_category("NETFLIX.COM MELBOURNE"), Some("Subscriptions"));
    }

    #[test]
    fn test_first_match_wins_not_best_match() {
        let rules = RuleSet::new(vec![
            rule("TRANSFER", "Transfer"),
            rule("TRANSFER TO SAVINGS", "Savings"),
        ]);
        assert_eq!(rules.match_category("TRANSFER TO SAVINGS 123"), Some("Transfer"));
        assert_eq!(rules.first_match("TRANSFER TO SAVINGS 123"), Some(0));
    }

    #[test]
    fn test_fallbacks() {
        let rules = RuleSet::new(vec![rule("COLES", "Groceries")]);
        let out = categorize(
            vec![
                txn(500.0, "MYSTERY DEPOSIT", "ANZ"),
                txn(-20.0, "MYSTERY SHOP", "ANZ"),
                txn(0.0, "ZERO", "ANZ"),
            ],
            &rules,
        );
        assert_eq!(out[0].category, INCOME);
        assert_eq!(out[1].category, UNCATEGORIZED);
        assert_eq!(out[2].category, UNCATEGORIZED);
    }

    #[test]
    fn test_rule_overrides_income_fallback() {
        let rules = RuleSet::new(vec![rule("REFUND", "Shopping")]);
        let out = categorize(vec![txn(30.0, "AMAZON REFUND", "ANZ")], &rules);
        assert_eq!(out[0].category, "Shopping");
    }

    #[test]
    fn test_deterministic_rerun() {
        let rules = RuleSet::new(vec![rule("UBER", "Transport"), rule("UBER EATS", "Dining")]);
        let input = vec![txn(-12.0, "UBER EATS SYDNEY", "ANZ"), txn(-8.0, "UBER TRIP", "ANZ")];
        let a = categorize(input.clone(), &rules);
        let b = categorize(input, &rules);
        assert_eq!(a, b);
        assert!(a.iter().all(|r| r.category == "Transport"));
    }

    struct FixedMatcher;

    impl CategoryMatcher for FixedMatcher {
        fn match_category(&self, _description: &str) -> Option<&str> {
            Some("Everything")
        }
    }

    #[test]
    fn test_alternate_matcher_plugs_in() {
        let out = categorize(vec![txn(-1.0, "ANY", "ANZ")], &FixedMatcher);
        assert_eq!(out[0].category, "Everything");
    }

    #[test]
    fn test_load_rules_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.csv");
        std::fs::write(
            &path,
            "pattern,category\nWOOLWORTHS,Groceries\n COLES ,Groceries\nSALARY,Income\n",
        )
        .unwrap();
        let rules = load_rules(&path).unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.rules()[1].pattern, "COLES");
        assert_eq!(rules.rules()[2].category, "Income");
    }

    #[test]
    fn test_load_rules_rejects_wrong_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.csv");
        std::fs::write(&path, "pattern,category,priority\nX,Y,1\n").unwrap();
        let err = load_rules(&path).unwrap_err();
        assert!(err.to_string().contains("expected header"), "got: {err}");
    }

    #[test]
    fn test_load_rules_rejects_blank_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.csv");
        std::fs::write(&path, "pattern,category\n,Groceries\n").unwrap();
        let err = load_rules(&path).unwrap_err();
        assert!(err.to_string().contains("must not be blank"), "got: {err}");
    }

    #[test]
    fn test_load_rules_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_rules(&dir.path().join("nope.csv")).is_err());
    }

    #[test]
    fn test_stats() {
        let rules = RuleSet::new(vec![rule("WOOLWORTHS", "Groceries"), rule("TFR", TRANSFER)]);
        let out = categorize(
            vec![
                txn(-10.0, "WOOLWORTHS", "ANZ"),
                txn(-5.0, "KIOSK", "ANZ"),
                txn(-6.0, "KIOSK", "Bankwest"),
                txn(-1.0, "TOLL", "Bankwest"),
                txn(100.0, "PAY", "Bankwest"),
                txn(-50.0, "TFR SAVINGS", "Bankwest"),
            ],
            &rules,
        );
        let stats = categorize_stats(&out, 10);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.uncategorized, 3);
        assert_eq!(stats.categorized, 3);
        assert_eq!(stats.categorized_pct(), 50.0);
        assert_eq!(stats.top_uncategorized[0].description, "KIOSK");
        assert_eq!(stats.top_uncategorized[0].count, 2);
        assert_eq!(stats.top_uncategorized[0].total, -11.0);
        assert_eq!(stats.top_uncategorized[1].description, "TOLL");
        let bw = stats
            .by_source
            .iter()
            .find(|s| s.source == "Bankwest")
            .unwrap();
        assert_eq!((bw.categorized, bw.total), (2, 4));
        assert_eq!(stats.by_category[0].category, UNCATEGORIZED);
        assert_eq!(stats.real_income, 100.0);
        assert_eq!(stats.real_expense, -22.0);
    }
}
