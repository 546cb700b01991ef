pub mod init;
pub mod report;
pub mod rules;
pub mod run;
pub mod status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "finpipe",
    version,
    about = "Normalize bank CSV exports, categorize them and report on spending."
)]
pub struct Cli {
    /// Data root holding raw/, processed/, the rules file and databases
    #[arg(long = "data-root", global = true)]
    pub data_root: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the data root layout and a starter rules file.
    Init,
    /// Run the full pipeline: normalize, combine, categorize, load.
    Run {
        /// Dataset: synthetic or real
        #[arg(default_value = "synthetic")]
        dataset: String,
    },
    /// Query the loaded store.
    Report {
        /// Dataset: synthetic or real
        #[arg(long, short, default_value = "synthetic")]
        dataset: String,
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Inspect categorization rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Show paths, raw file counts and what is currently loaded.
    Status {
        /// Dataset: synthetic or real
        #[arg(default_value = "synthetic")]
        dataset: String,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Spend per category per month, with share of the month.
    Breakdown {
        /// Only this month: YYYY-MM
        #[arg(long)]
        month: Option<String>,
    },
    /// Month-over-month expenses, income and net savings.
    Trends,
    /// Savings rate for months with income.
    Savings,
    /// Biggest merchants in each category.
    Merchants {
        /// Merchants per category
        #[arg(long, default_value_t = crate::reports::DEFAULT_MERCHANT_LIMIT)]
        limit: usize,
    },
    /// Count, total, mean and extremes per category.
    Summary,
    /// Monthly inflows, outflows and running balance.
    Cashflow,
    /// Every report in turn.
    All,
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// List rules in match order.
    List,
    /// Show which category a description would get.
    Test {
        /// Transaction description to try
        description: String,
        /// Treat as income when no rule matches
        #[arg(long)]
        income: bool,
    },
}
