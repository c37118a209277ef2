//! The monitor: tail the configured logs into the block store.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::lock::LockGuard;
use crate::store::BlockStore;
use crate::tailer::Tailer;

pub fn run(patterns: Vec<String>, config_path: &Path) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    if !patterns.is_empty() {
        config.patterns = patterns;
    }
    config.validate()?;

    let store = BlockStore::open(&config)?;
    let _lock = LockGuard::acquire(&config.store_dir)?;

    let excludes = config.exclude_regexes()?;
    let mut tailer = Tailer::new(&config.patterns, excludes, config.idle_timeout())?;
    info!(
        "Watching {} directory(ies), sweeping every {}s",
        tailer.watch_count(),
        config.check_period().as_secs()
    );

    tailer.run(
        |_path, line| store.record_hit(line),
        config.check_period(),
        |now| match store.sweep(now) {
            Ok(stats) => info!(
                "Sweep: {} scanned, {} decayed ({} newly), {} forgotten",
                stats.scanned, stats.decayed, stats.newly_decayed, stats.forgotten
            ),
            Err(e) => warn!("Sweep failed: {:#}", e),
        },
    )
}
