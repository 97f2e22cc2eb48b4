//! Show command

use super::StoreArgs;
use clap::Args;
use difflog_core::DiffLog;
use difflog_store::open_from_config;

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Entity kind
    #[arg(long)]
    pub kind: String,

    /// Entity identifier
    #[arg(long)]
    pub id: String,

    /// Include diffs related through the relation index
    #[arg(long, conflicts_with = "last")]
    pub all: bool,

    /// Only the newest N diffs
    #[arg(long)]
    pub last: Option<usize>,
}

/// Prints one JSON object per diff, oldest first.
pub fn execute(args: ShowArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.store.resolve()?;
    let backends = open_from_config(&config)?;

    let mut log = DiffLog::new(args.kind, backends.store, &config);
    if let Some(index) = backends.index {
        log = log.with_index(index);
    }

    let diffs = if args.all {
        log.get_all_for_entity(&args.id)?
    } else if let Some(n) = args.last {
        log.get_last(&args.id, n)?
    } else {
        log.get_for_entity(&args.id)?
    };

    for diff in &diffs {
        println!("{}", serde_json::to_string(diff)?);
    }
    Ok(())
}
