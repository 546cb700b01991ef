//! Aggregate views over the stored `transactions` table.
//!
//! Each `get_*` function reads the whole table and recomputes from scratch.
//! The window-style logic (lag over months, rank within category) is done with
//! explicit grouping, stable sorts and indexing so results do not depend on a
//! particular SQL engine. Ties always fall back to first appearance in id
//! order.

use std::collections::{BTreeMap, HashMap};

use rusqlite::Connection;

use crate::categorizer::{INCOME, TRANSFER, UNCATEGORIZED};
use crate::db::read_transactions;
use crate::error::Result;
use crate::models::StoredTransaction;

pub const DEFAULT_MERCHANT_LIMIT: usize = 5;

/// `ROUND(x, 1)`: one decimal, halves away from zero.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Default, Clone, Copy)]
struct MonthTotals {
    expenses: f64,
    income: f64,
}

/// Expense magnitude and income per month, `Transfer` left out. Every month
/// with any stored row appears, even if both sums are zero.
fn monthly_totals(rows: &[StoredTransaction]) -> BTreeMap<String, MonthTotals> {
    let mut months: BTreeMap<String, MonthTotals> = BTreeMap::new();
    for row in rows {
        let entry = months.entry(row.month()).or_default();
        if row.category == TRANSFER {
            continue;
        }
        if row.is_expense() {
            entry.expenses += row.amount.abs();
        } else if row.is_income() {
            entry.income += row.amount;
        }
    }
    months
}

// ---------------------------------------------------------------------------
// Monthly category breakdown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyCategorySpend {
    pub month: String,
    pub category: String,
    pub category_total: f64,
    pub month_total: f64,
    pub pct_of_month: Option<f64>,
}

pub fn monthly_category_breakdown(rows: &[StoredTransaction]) -> Vec<MonthlyCategorySpend> {
    let mut month_totals: HashMap<String, f64> = HashMap::new();
    let mut groups: Vec<(String, String, f64)> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for row in rows {
        if !row.is_expense() || row.category == TRANSFER || row.category == INCOME {
            continue;
        }
        let month = row.month();
        *month_totals.entry(month.clone()).or_default() += row.amount;
        let key = (month.clone(), row.category.clone());
        match index.get(&key) {
            Some(&i) => groups[i].2 += row.amount,
            None => {
                index.insert(key, groups.len());
                groups.push((month, row.category.clone(), row.amount));
            }
        }
    }

    let mut out: Vec<MonthlyCategorySpend> = groups
        .into_iter()
        .map(|(month, category, category_total)| {
            let month_total = month_totals.get(&month).copied().unwrap_or(0.0);
            let pct_of_month =
                (month_total != 0.0).then(|| round1(category_total / month_total * 100.0));
            MonthlyCategorySpend {
                month,
                category,
                category_total,
                month_total,
                pct_of_month,
            }
        })
        .collect();

    out.sort_by(|a, b| {
        b.month
            .cmp(&a.month)
            .then(a.category_total.total_cmp(&b.category_total))
            .then_with(|| a.category.cmp(&b.category))
    });
    out
}

// ---------------------------------------------------------------------------
// Month-over-month trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MonthTrend {
    pub month: String,
    pub total_expenses: f64,
    pub total_income: f64,
    pub prev_month_expenses: Option<f64>,
    pub expense_change_pct: Option<f64>,
    pub net_savings: f64,
}

/// Newest month first.
pub fn month_over_month(rows: &[StoredTransaction]) -> Vec<MonthTrend> {
    let mut prev: Option<f64> = None;
    let mut out = Vec::new();
    for (month, totals) in monthly_totals(rows) {
        let expense_change_pct = prev
            .filter(|p| *p > 0.0)
            .map(|p| round1((totals.expenses - p) / p * 100.0));
        out.push(MonthTrend {
            month,
            total_expenses: totals.expenses,
            total_income: totals.income,
            prev_month_expenses: prev,
            expense_change_pct,
            net_savings: totals.income - totals.expenses,
        });
        prev = Some(totals.expenses);
    }
    out.reverse();
    out
}

// ---------------------------------------------------------------------------
// Savings rate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MonthSavings {
    pub month: String,
    pub income: f64,
    pub expenses: f64,
    pub savings: f64,
    pub savings_rate_pct: Option<f64>,
}

/// Months without income are omitted. Newest month first.
pub fn savings_rate(rows: &[StoredTransaction]) -> Vec<MonthSavings> {
    let mut out: Vec<MonthSavings> = monthly_totals(rows)
        .into_iter()
        .filter(|(_, t)| t.income > 0.0)
        .map(|(month, t)| {
            let savings = t.income - t.expenses;
            MonthSavings {
                month,
                income: t.income,
                expenses: t.expenses,
                savings,
                savings_rate_pct: (t.income > 0.0).then(|| round1(savings / t.income * 100.0)),
            }
        })
        .collect();
    out.reverse();
    out
}

// ---------------------------------------------------------------------------
// Top merchants per category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MerchantRank {
    pub category: String,
    pub rank: usize,
    pub merchant: String,
    pub transaction_count: i64,
    pub total_amount: f64,
}

/// Biggest spend first within each category (ascending signed sum), at most
/// `limit` per category. Categories in name order.
pub fn top_merchants(rows: &[StoredTransaction], limit: usize) -> Vec<MerchantRank> {
    let mut by_category: BTreeMap<String, Vec<MerchantRank>> = BTreeMap::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for row in rows {
        if !row.is_expense()
            || row.category == TRANSFER
            || row.category == INCOME
            || row.category == UNCATEGORIZED
        {
            continue;
        }
        let merchant = row.description.clone().unwrap_or_default();
        let group = by_category.entry(row.category.clone()).or_default();
        match index.get(&(row.category.clone(), merchant.clone())) {
            Some(&i) => {
                group[i].transaction_count += 1;
                group[i].total_amount += row.amount;
            }
            None => {
                index.insert((row.category.clone(), merchant.clone()), group.len());
                group.push(MerchantRank {
                    category: row.category.clone(),
                    rank: 0,
                    merchant,
                    transaction_count: 1,
                    total_amount: row.amount,
                });
            }
        }
    }

    let mut out = Vec::new();
    for (_, mut merchants) in by_category {
        // stable: equal sums keep first-appearance order
        merchants.sort_by(|a, b| a.total_amount.total_cmp(&b.total_amount));
        merchants.truncate(limit);
        for (i, mut m) in merchants.into_iter().enumerate() {
            m.rank = i + 1;
            out.push(m);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Category summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CategorySummary {
    pub category: String,
    pub transaction_count: i64,
    pub total_amount: f64,
    pub avg_amount: f64,
    /// Amount of the smallest-magnitude transaction.
    pub min_amount: f64,
    /// Amount of the largest-magnitude transaction.
    pub max_amount: f64,
}

/// All non-transfer rows. Magnitude ties go to the lowest id.
pub fn category_summary(rows: &[StoredTransaction]) -> Vec<CategorySummary> {
    let mut out: Vec<CategorySummary> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for row in rows.iter().filter(|r| r.category != TRANSFER) {
        match index.get(row.category.as_str()) {
            Some(&i) => {
                let s = &mut out[i];
                s.transaction_count += 1;
                s.total_amount += row.amount;
                if row.amount.abs() < s.min_amount.abs() {
                    s.min_amount = row.amount;
                }
                if row.amount.abs() > s.max_amount.abs() {
                    s.max_amount = row.amount;
                }
            }
            None => {
                index.insert(row.category.as_str(), out.len());
                out.push(CategorySummary {
                    category: row.category.clone(),
                    transaction_count: 1,
                    total_amount: row.amount,
                    avg_amount: 0.0,
                    min_amount: row.amount,
                    max_amount: row.amount,
                });
            }
        }
    }

    for s in &mut out {
        s.avg_amount = s.total_amount / s.transaction_count as f64;
    }
    out.sort_by(|a, b| {
        a.total_amount
            .total_cmp(&b.total_amount)
            .then_with(|| a.category.cmp(&b.category))
    });
    out
}

// ---------------------------------------------------------------------------
// Cash flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CashflowMonth {
    pub month: String,
    pub inflows: f64,
    pub outflows: f64,
    pub net: f64,
    pub running_balance: f64,
}

/// Oldest month first; `running_balance` is the cumulative net.
pub fn cashflow(rows: &[StoredTransaction]) -> Vec<CashflowMonth> {
    let mut flows: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for row in rows {
        let entry = flows.entry(row.month()).or_default();
        if row.amount > 0.0 {
            entry.0 += row.amount;
        } else {
            entry.1 += row.amount;
        }
    }

    let mut running = 0.0f64;
    flows
        .into_iter()
        .map(|(month, (inflows, outflows))| {
            running += inflows + outflows;
            CashflowMonth {
                month,
                inflows,
                outflows,
                net: inflows + outflows,
                running_balance: running,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub months: usize,
    pub avg_expenses: f64,
    pub avg_income: f64,
    pub avg_net_savings: f64,
    pub avg_savings_rate: Option<f64>,
}

pub fn overview(trends: &[MonthTrend], savings: &[MonthSavings]) -> Option<Overview> {
    if trends.is_empty() {
        return None;
    }
    let n = trends.len() as f64;
    let rates: Vec<f64> = savings.iter().filter_map(|s| s.savings_rate_pct).collect();
    let avg_savings_rate =
        (!rates.is_empty()).then(|| rates.iter().sum::<f64>() / rates.len() as f64);
    Some(Overview {
        months: trends.len(),
        avg_expenses: trends.iter().map(|t| t.total_expenses).sum::<f64>() / n,
        avg_income: trends.iter().map(|t| t.total_income).sum::<f64>() / n,
        avg_net_savings: trends.iter().map(|t| t.net_savings).sum::<f64>() / n,
        avg_savings_rate,
    })
}

// ---------------------------------------------------------------------------
// Store-backed entry points
// ---------------------------------------------------------------------------

pub fn get_monthly_breakdown(conn: &Connection) -> Result<Vec<MonthlyCategorySpend>> {
    Ok(monthly_category_breakdown(&read_transactions(conn)?))
}

pub fn get_month_over_month(conn: &Connection) -> Result<Vec<MonthTrend>> {
    Ok(month_over_month(&read_transactions(conn)?))
}

pub fn get_savings_rate(conn: &Connection) -> Result<Vec<MonthSavings>> {
    Ok(savings_rate(&read_transactions(conn)?))
}

pub fn get_top_merchants(conn: &Connection, limit: Option<usize>) -> Result<Vec<MerchantRank>> {
    Ok(top_merchants(
        &read_transactions(conn)?,
        limit.unwrap_or(DEFAULT_MERCHANT_LIMIT),
    ))
}

pub fn get_category_summary(conn: &Connection) -> Result<Vec<CategorySummary>> {
    Ok(category_summary(&read_transactions(conn)?))
}

pub fn get_cashflow(conn: &Connection) -> Result<Vec<CashflowMonth>> {
    Ok(cashflow(&read_transactions(conn)?))
}

pub fn get_overview(conn: &Connection) -> Result<Option<Overview>> {
    let rows = read_transactions(conn)?;
    Ok(overview(&month_over_month(&rows), &savings_rate(&rows)))
}
