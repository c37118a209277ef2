//! One-shot sweep of the block store.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::store::BlockStore;
use crate::utils::now_secs;

pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let store = BlockStore::open(&config)?;
    let stats = store.sweep(now_secs())?;

    println!(
        "Swept {} record(s): {} decayed ({} newly), {} forgotten",
        stats.scanned, stats.decayed, stats.newly_decayed, stats.forgotten
    );
    Ok(())
}
