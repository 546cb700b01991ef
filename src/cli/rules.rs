use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::categorizer::{assign_category, load_rules};
use crate::error::Result;
use crate::models::Transaction;
use crate::settings::Settings;

pub fn list(settings: &Settings) -> Result<()> {
    let path = settings.rules_path();
    let rules = load_rules(&path)?;

    let mut table = Table::new();
    table.set_header(vec!["#", "Pattern", "Category"]);
    for (i, rule) in rules.rules().iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&rule.pattern),
            Cell::new(&rule.category),
        ]);
    }
    println!("Rules from {} (first match wins)\n{table}", path.display());
    Ok(())
}

pub fn test(settings: &Settings, description: &str, income: bool) -> Result<()> {
    let rules = load_rules(&settings.rules_path())?;
    let amount = if income { 1.0 } else { -1.0 };
    let sample = Transaction::new(chrono::Local::now().date_naive(), amount, description, "-");
    let category = assign_category(&sample, &rules);

    match rules.first_match(&sample.description) {
        Some(i) => println!(
            "{} -> {} (rule {}: '{}')",
            sample.description,
            category.green().bold(),
            i + 1,
            rules.rules()[i].pattern
        ),
        None => println!(
            "{} -> {} (no rule matched)",
            sample.description,
            category.yellow().bold()
        ),
    }
    Ok(())
}
