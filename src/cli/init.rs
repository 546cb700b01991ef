use crate::error::Result;
use crate::models::Dataset;
use crate::settings::{save_settings, shellexpand_path, Settings};

const STARTER_RULES: &str = "\
pattern,category
TRANSFER,Transfer
SALARY,Income
WOOLWORTHS,Groceries
COLES,Groceries
ALDI,Groceries
NETFLIX,Subscriptions
SPOTIFY,Subscriptions
UBER EATS,Dining
UBER,Transport
SHELL,Fuel
";

pub fn run(settings: &Settings) -> Result<()> {
    let mut settings = settings.clone();
    let expanded = shellexpand_path(&settings.data_root);
    std::fs::create_dir_all(&expanded)?;
    // canonicalize only resolves once the directory exists
    settings.data_root = shellexpand_path(&expanded);
    save_settings(&settings)?;

    for dataset in [Dataset::Synthetic, Dataset::Real] {
        std::fs::create_dir_all(settings.raw_dir(dataset))?;
        std::fs::create_dir_all(settings.processed_dir(dataset))?;
    }

    let rules_path = settings.rules_path();
    if rules_path.exists() {
        println!("Keeping existing rules at {}", rules_path.display());
    } else {
        if let Some(parent) = rules_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&rules_path, STARTER_RULES)?;
        println!("Wrote starter rules to {}", rules_path.display());
    }

    println!("Initialized finpipe at {}", settings.data_root().display());
    println!(
        "Drop bank exports into {} and run `finpipe run`.",
        settings.raw_dir(Dataset::Synthetic).display()
    );
    Ok(())
}
