use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::{count_label, money};
use crate::models::Dataset;
use crate::pipeline::{run_pipeline, PipelineReport};
use crate::settings::Settings;

pub fn run(settings: &Settings, dataset: &str) -> Result<()> {
    let dataset: Dataset = dataset.parse()?;
    let report = run_pipeline(settings, dataset)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &PipelineReport) {
    let mut table = Table::new();
    table.set_header(vec![
        "Source",
        "Files",
        "Rows",
        "Duplicates",
        "Out of window",
        "Kept",
        "Range",
        "Income",
        "Expenses",
    ]);
    for s in &report.sources {
        let files = if s.skipped_files > 0 {
            format!("{} (+{} identical)", s.files, s.skipped_files)
        } else {
            s.files.to_string()
        };
        let range = match s.date_range {
            Some((first, last)) => format!("{first} to {last}"),
            None => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(s.source_id),
            Cell::new(files),
            Cell::new(s.rows_read),
            Cell::new(s.duplicates_removed),
            Cell::new(s.filtered_out),
            Cell::new(s.kept),
            Cell::new(range),
            Cell::new(format!("{} ({})", s.income.count, money(s.income.total))),
            Cell::new(format!("{} ({})", s.expense.count, money(s.expense.total))),
        ]);
    }
    for missing in &report.missing_sources {
        let mut row = vec![Cell::new(missing.dimmed())];
        row.extend((0..8).map(|_| Cell::new("-")));
        table.add_row(row);
    }
    println!("Normalize ({})\n{table}", report.dataset);

    println!(
        "\nCombined {} ({} cross-source duplicates removed)",
        count_label(report.combined_rows, "transaction", "transactions"),
        report.cross_source_duplicates
    );
    let mut sources = Table::new();
    sources.set_header(vec!["Source", "Count", "Net"]);
    for s in &report.by_source {
        sources.add_row(vec![
            Cell::new(&s.source),
            Cell::new(s.count),
            Cell::new(money(s.net_total)),
        ]);
    }
    println!("{sources}");

    let stats = &report.stats;
    println!(
        "\nCategorized {}/{} ({:.1}%) using {}, {} uncategorized",
        stats.categorized,
        stats.total,
        stats.categorized_pct(),
        count_label(report.rule_count, "rule", "rules"),
        stats.uncategorized
    );
    let mut rates = Table::new();
    rates.set_header(vec!["Source", "Categorized", "Rate"]);
    for s in &stats.by_source {
        rates.add_row(vec![
            Cell::new(&s.source),
            Cell::new(format!("{}/{}", s.categorized, s.total)),
            Cell::new(format!("{:.1}%", s.rate_pct())),
        ]);
    }
    println!("{rates}");

    let mut by_category = Table::new();
    by_category.set_header(vec!["Category", "Count", "Total"]);
    for c in &stats.by_category {
        by_category.add_row(vec![
            Cell::new(&c.category),
            Cell::new(c.count),
            Cell::new(money(c.total)),
        ]);
    }
    println!("\n{}\n{by_category}", "By category".bold());

    if !stats.top_uncategorized.is_empty() {
        let mut top = Table::new();
        top.set_header(vec!["Description", "Count", "Total"]);
        for m in &stats.top_uncategorized {
            top.add_row(vec![
                Cell::new(&m.description),
                Cell::new(m.count),
                Cell::new(money(m.total)),
            ]);
        }
        println!("\n{}\n{top}", "Top uncategorized".yellow().bold());
    }
    println!(
        "Income {}  Expenses {}  (transfers excluded)",
        money(stats.real_income).green(),
        money(stats.real_expense).red()
    );

    let load = &report.load;
    let mut categories = Table::new();
    categories.set_header(vec!["Category", "Count", "Total"]);
    for c in &load.categories {
        categories.add_row(vec![
            Cell::new(&c.category),
            Cell::new(c.count),
            Cell::new(money(c.total)),
        ]);
    }
    println!("\nLoaded into {}\n{categories}", report.db_path.display());
    if let Some((start, end)) = load.date_range {
        println!("Date range: {start} to {end}");
    }
    println!(
        "{} {} rows, total {}",
        "Validated".green().bold(),
        load.row_count,
        money(load.amount_total)
    );
    if let Some(dir) = &report.processed_dir {
        println!("Processed files in {}", dir.display());
    }
}
