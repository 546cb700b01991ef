use colored::Colorize;

use crate::db::{open_store, summarize};
use crate::error::{PipelineError, Result};
use crate::fmt::money;
use crate::importer::{find_source_files, ALL_SOURCES};
use crate::models::Dataset;
use crate::settings::{settings_path, Settings};

pub fn run(settings: &Settings, dataset: &str) -> Result<()> {
    let dataset: Dataset = dataset.parse()?;
    let raw_dir = settings.raw_dir(dataset);
    let db_path = settings.db_path(dataset);

    println!("Settings:   {}", settings_path().display());
    println!("Data root:  {}", settings.data_root().display());
    println!("Dataset:    {dataset}");
    println!("Raw files:  {}", raw_dir.display());
    println!("Rules:      {}", settings.rules_path().display());
    println!("Database:   {}", db_path.display());
    match settings.date_window {
        Some(w) => println!(
            "Window:     {} to {} ({})",
            w.start,
            w.end,
            settings.windowed_sources.join(", ")
        ),
        None => println!("Window:     (none)"),
    }

    println!();
    for &kind in ALL_SOURCES {
        let files = find_source_files(&raw_dir, kind)?;
        let label = format!("{:<10}", kind.source_id());
        if files.is_empty() {
            println!("{}  {}", label, "no files".dimmed());
        } else {
            println!("{label}  {} file(s)", files.len());
        }
    }

    println!();
    match open_store(&db_path) {
        Ok(conn) => {
            let report = summarize(&conn)?;
            println!("Transactions:  {}", report.row_count);
            println!("Amount total:  {}", money(report.amount_total));
            if let Some((start, end)) = report.date_range {
                println!("Date range:    {start} to {end}");
            }
            println!("Categories:    {}", report.categories.len());
        }
        Err(PipelineError::MissingStore(_)) => {
            println!("Nothing loaded yet. Run `finpipe run {dataset}`.");
        }
        Err(e) => return Err(e),
    }
    Ok(())
}
