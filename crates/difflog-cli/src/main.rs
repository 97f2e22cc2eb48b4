//! difflog CLI
//!
//! Maintenance and inspection commands for diff logs

use clap::{Parser, Subcommand, ValueEnum};
use difflog_core::logging_facility::{self, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "difflog")]
#[command(about = "difflog - per-entity change logs", long_about = None)]
struct Cli {
    /// Emit structured logs to stderr
    #[arg(long, global = true, value_enum)]
    log: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan the store and remove diffs older than the retention age
    Prune(commands::prune::PruneArgs),
    /// Print the diffs recorded for one entity
    Show(commands::show::ShowArgs),
    /// List keys in the store
    Keys(commands::keys::KeysArgs),
}

fn main() {
    let cli = Cli::parse();

    match cli.log {
        Some(LogFormat::Human) => logging_facility::init(Profile::Development),
        Some(LogFormat::Json) => logging_facility::init(Profile::Production),
        None => {}
    }

    let result = match cli.command {
        Commands::Prune(args) => commands::prune::execute(args),
        Commands::Show(args) => commands::show::execute(args),
        Commands::Keys(args) => commands::keys::execute(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
