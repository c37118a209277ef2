//! Look up the block record for one address.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::store::BlockStore;
use crate::utils::{format_duration, now_secs};
use crate::validation::parse_address_token;

pub fn run(address: &str, config_path: &Path) -> Result<()> {
    parse_address_token(address)?;

    let config = Config::load_or_default(config_path)?;
    let store = BlockStore::open(&config)?;

    match store.lookup(address)? {
        Some(entry) => {
            let stage = if entry.decayed { "decayed" } else { "active" };
            let now = u64::from(now_secs());
            let expires = entry.record.expires_at();
            let when = if expires > now {
                format!("expires in {}", format_duration(expires - now))
            } else {
                format!("expired {} ago", format_duration(now - expires))
            };
            println!(
                "{} is {} (duration {}, {})",
                address,
                stage,
                format_duration(u64::from(entry.record.duration)),
                when
            );
            Ok(())
        }
        None => anyhow::bail!("No record for {}", address),
    }
}
