//! Prune command

use super::StoreArgs;
use chrono::Utc;
use clap::Args;
use difflog_core::pruner::min_age_timestamp;
use difflog_core::{KeyOutcome, PruneReport, Pruner};
use difflog_store::open_from_config;

#[derive(Debug, Args)]
pub struct PruneArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Retention age in seconds (overrides the configured value)
    #[arg(long)]
    pub max_element_age: Option<u64>,
}

/// Per-key failures are reported on stderr and do not fail the command.
/// An interrupted pass prints the keys it got through, then fails.
pub fn execute(args: PruneArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = args.store.resolve()?;
    if let Some(age) = args.max_element_age {
        config.max_element_age = age;
        config.validate()?;
    }

    let backends = open_from_config(&config)?;
    let mut pruner = Pruner::new(backends.store, config.key_prefix.clone());
    if let Some(index) = backends.index {
        pruner = pruner.with_index(index);
    }

    let now = Utc::now();
    println!(
        "Minimum age: {}",
        min_age_timestamp(now, config.max_element_age)
    );

    match pruner.prune_at(now, config.max_element_age) {
        Ok(report) => {
            print_outcomes(&report);
            Ok(())
        }
        Err(interrupted) => {
            print_outcomes(&interrupted.partial);
            Err(Box::new(interrupted))
        }
    }
}

fn print_outcomes(report: &PruneReport) {
    for outcome in &report.outcomes {
        match outcome {
            KeyOutcome::Pruned { key, removed } => {
                println!("{} elements removed from {}", removed, key)
            }
            KeyOutcome::Skipped { key } => println!("skipping key: {}", key),
            KeyOutcome::Failed { key, error } => {
                eprintln!("Pruning key \"{}\" failed: \"{}\"", key, error)
            }
        }
    }
}
