//! Tabular listing of the store's block records.

use anyhow::Result;
use chrono::{Local, LocalResult, TimeZone};
use std::path::Path;

use crate::config::Config;
use crate::store::BlockStore;
use crate::utils::{format_duration, truncate};

pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let store = BlockStore::open(&config)?;
    let entries = store.entries()?;

    if entries.is_empty() {
        println!("No block records in {}", config.store_dir.display());
        return Ok(());
    }

    println!();
    println!(" ADDRESS                                  STAGE    DURATION   EXPIRES");
    println!(" ──────────────────────────────────────── ──────── ────────── ───────────────────");
    for entry in &entries {
        let stage = if entry.decayed { "decayed" } else { "active" };
        println!(
            " {:<40} {:<8} {:>10} {}",
            truncate(&entry.token, 40),
            stage,
            format_duration(u64::from(entry.record.duration)),
            format_local(entry.record.expires_at()),
        );
    }
    println!();
    println!(" {} record(s) in {}", entries.len(), config.store_dir.display());
    Ok(())
}

fn format_local(unix: u64) -> String {
    match Local.timestamp_opt(unix as i64, 0) {
        LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => format!("@{}", unix),
    }
}
