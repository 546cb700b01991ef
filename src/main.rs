mod categorizer;
mod cli;
mod combiner;
mod db;
mod error;
mod fmt;
mod importer;
mod models;
mod pipeline;
mod reports;
mod settings;

use clap::Parser;

use cli::{Cli, Commands, RulesCommands};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> error::Result<()> {
    let mut settings = settings::load_settings()?;
    if let Some(root) = cli.data_root {
        settings.data_root = root;
    }

    match cli.command {
        Commands::Init => cli::init::run(&settings),
        Commands::Run { dataset } => cli::run::run(&settings, &dataset),
        Commands::Report { dataset, command } => cli::report::run(&settings, &dataset, command),
        Commands::Rules { command } => match command {
            RulesCommands::List => cli::rules::list(&settings),
            RulesCommands::Test {
                description,
                income,
            } => cli::rules::test(&settings, &description, income),
        },
        Commands::Status { dataset } => cli::status::run(&settings, &dataset),
    }
}
