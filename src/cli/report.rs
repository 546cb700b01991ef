use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::Connection;

use crate::cli::ReportCommands;
use crate::db::open_store;
use crate::error::Result;
use crate::fmt::{money, pct};
use crate::models::Dataset;
use crate::reports;
use crate::settings::Settings;

pub fn run(settings: &Settings, dataset: &str, command: ReportCommands) -> Result<()> {
    let dataset: Dataset = dataset.parse()?;
    let conn = open_store(&settings.db_path(dataset))?;

    match command {
        ReportCommands::Breakdown { month } => breakdown(&conn, month.as_deref()),
        ReportCommands::Trends => trends(&conn),
        ReportCommands::Savings => savings(&conn),
        ReportCommands::Merchants { limit } => merchants(&conn, limit),
        ReportCommands::Summary => summary(&conn),
        ReportCommands::Cashflow => cashflow(&conn),
        ReportCommands::All => {
            all(&conn);
            Ok(())
        }
    }
}

/// Runs every report; a failing section is reported and skipped.
fn all(conn: &Connection) {
    let sections: [(&str, &dyn Fn(&Connection) -> Result<()>); 7] = [
        ("overview", &overview),
        ("breakdown", &|c: &Connection| breakdown(c, None)),
        ("trends", &trends),
        ("savings", &savings),
        ("merchants", &|c: &Connection| merchants(c, reports::DEFAULT_MERCHANT_LIMIT)),
        ("summary", &summary),
        ("cashflow", &cashflow),
    ];
    for (name, section) in sections {
        if let Err(e) = section(conn) {
            eprintln!("{} {name}: {e}", "Report failed:".red().bold());
        }
        println!();
    }
}

fn overview(conn: &Connection) -> Result<()> {
    let Some(o) = reports::get_overview(conn)? else {
        println!("No transactions loaded.");
        return Ok(());
    };
    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec![Cell::new("Months"), Cell::new(o.months)]);
    table.add_row(vec![Cell::new("Avg monthly expenses"), Cell::new(money(o.avg_expenses))]);
    table.add_row(vec![Cell::new("Avg monthly income"), Cell::new(money(o.avg_income))]);
    let net = money(o.avg_net_savings);
    let net_cell = if o.avg_net_savings >= 0.0 {
        Cell::new(net.green())
    } else {
        Cell::new(net.red())
    };
    table.add_row(vec![Cell::new("Avg net savings"), net_cell]);
    table.add_row(vec![Cell::new("Avg savings rate"), Cell::new(pct(o.avg_savings_rate))]);
    println!("Overview\n{table}");
    Ok(())
}

fn breakdown(conn: &Connection, month: Option<&str>) -> Result<()> {
    let rows = reports::get_monthly_breakdown(conn)?;

    let mut table = Table::new();
    table.set_header(vec!["Month", "Category", "Spent", "Month total", "% of month"]);
    for r in rows.iter().filter(|r| month.map_or(true, |m| r.month == m)) {
        table.add_row(vec![
            Cell::new(&r.month),
            Cell::new(&r.category),
            Cell::new(money(r.category_total.abs())),
            Cell::new(money(r.month_total.abs())),
            Cell::new(pct(r.pct_of_month)),
        ]);
    }
    println!("Monthly Spend by Category\n{table}");
    Ok(())
}

fn trends(conn: &Connection) -> Result<()> {
    let rows = reports::get_month_over_month(conn)?;

    let mut table = Table::new();
    table.set_header(vec!["Month", "Expenses", "Income", "Prev expenses", "Change", "Net savings"]);
    for r in &rows {
        let change = match r.expense_change_pct {
            Some(c) if c > 0.0 => Cell::new(pct(Some(c)).red()),
            Some(c) => Cell::new(pct(Some(c)).green()),
            None => Cell::new(pct(None)),
        };
        table.add_row(vec![
            Cell::new(&r.month),
            Cell::new(money(r.total_expenses)),
            Cell::new(money(r.total_income)),
            Cell::new(r.prev_month_expenses.map(money).unwrap_or_else(|| "-".to_string())),
            change,
            Cell::new(money(r.net_savings)),
        ]);
    }
    println!("Month-over-Month Trends\n{table}");
    Ok(())
}

fn savings(conn: &Connection) -> Result<()> {
    let rows = reports::get_savings_rate(conn)?;

    let mut table = Table::new();
    table.set_header(vec!["Month", "Income", "Expenses", "Savings", "Rate"]);
    for r in &rows {
        let rate = pct(r.savings_rate_pct);
        let rate = if r.savings >= 0.0 { rate.green() } else { rate.red() };
        table.add_row(vec![
            Cell::new(&r.month),
            Cell::new(money(r.income)),
            Cell::new(money(r.expenses)),
            Cell::new(money(r.savings)),
            Cell::new(rate),
        ]);
    }
    println!("Savings Rate\n{table}");
    Ok(())
}

fn merchants(conn: &Connection, limit: usize) -> Result<()> {
    let rows = reports::get_top_merchants(conn, Some(limit))?;

    let mut table = Table::new();
    table.set_header(vec!["Category", "#", "Merchant", "Count", "Spent"]);
    for r in &rows {
        let category = if r.rank == 1 {
            Cell::new(r.category.as_str().bold())
        } else {
            Cell::new("")
        };
        table.add_row(vec![
            category,
            Cell::new(r.rank),
            Cell::new(&r.merchant),
            Cell::new(r.transaction_count),
            Cell::new(money(r.total_amount.abs())),
        ]);
    }
    println!("Top Merchants per Category\n{table}");
    Ok(())
}

fn summary(conn: &Connection) -> Result<()> {
    let rows = reports::get_category_summary(conn)?;

    let mut table = Table::new();
    table.set_header(vec!["Category", "Count", "Total", "Average", "Smallest", "Largest"]);
    for r in &rows {
        table.add_row(vec![
            Cell::new(&r.category),
            Cell::new(r.transaction_count),
            Cell::new(money(r.total_amount)),
            Cell::new(money(r.avg_amount)),
            Cell::new(money(r.min_amount)),
            Cell::new(money(r.max_amount)),
        ]);
    }
    println!("Category Summary\n{table}");
    Ok(())
}

fn cashflow(conn: &Connection) -> Result<()> {
    let rows = reports::get_cashflow(conn)?;

    let mut table = Table::new();
    table.set_header(vec!["Month", "Inflows", "Outflows", "Net", "Running Balance"]);
    for r in &rows {
        table.add_row(vec![
            Cell::new(&r.month),
            Cell::new(money(r.inflows)),
            Cell::new(money(r.outflows.abs())),
            Cell::new(money(r.net)),
            Cell::new(money(r.running_balance)),
        ]);
    }
    println!("Cash Flow\n{table}");
    Ok(())
}
