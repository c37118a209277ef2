//! Delete the block record for one address.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::store::BlockStore;
use crate::validation::parse_address_token;

pub fn run(address: &str, config_path: &Path) -> Result<()> {
    parse_address_token(address)?;

    let config = Config::load_or_default(config_path)?;
    let store = BlockStore::open(&config)?;

    if store.forget(address)? {
        println!("Forgot {}", address);
        Ok(())
    } else {
        anyhow::bail!("No record for {}", address)
    }
}
