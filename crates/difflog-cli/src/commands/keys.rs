//! Keys command

use super::StoreArgs;
use clap::Args;
use difflog_store::open_from_config;

#[derive(Debug, Args)]
pub struct KeysArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Only keys starting with this prefix (defaults to the configured key prefix)
    #[arg(long)]
    pub prefix: Option<String>,
}

pub fn execute(args: KeysArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.store.resolve()?;
    let backends = open_from_config(&config)?;
    let prefix = args.prefix.unwrap_or_else(|| config.key_prefix.clone());

    for key in backends.store.scan_keys(prefix) {
        println!("{}", key?);
    }
    Ok(())
}
