//! # blocktail - Log-Tailing Address Blocker for Linux Hosts
//!
//! A long-running monitor that tails log files matched by glob patterns,
//! extracts the leading address token from each appended line, and keeps a
//! durable per-address block record with exponential backoff and a
//! decay/forget lifecycle. Enforcement is deliberately external: anything
//! that can read the store directory (firewall glue, a PAM module, a cron
//! job) decides what a block means.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        blocktail                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: run, sweep, status, check, forget          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── Patterns, excludes, durations, allowlist             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Notifier (inotify)                                         │
//! │    └── Pollable channel, raw event record decoding          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Tailer (glob + regex)                                      │
//! │    ├── Watch set resolved from brace-expanded patterns      │
//! │    └── (device, inode)-keyed handle cache, TTL eviction     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BlockStore (crc32fast)                                     │
//! │    ├── One checksummed record file per address              │
//! │    └── active -> decayed (.pre) -> forgotten lifecycle      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use blocktail::config::Config;
//! use blocktail::store::BlockStore;
//! use blocktail::tailer::Tailer;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/blocktail/config.yaml")?;
//!     config.validate()?;
//!
//!     let store = BlockStore::open(&config)?;
//!     let mut tailer = Tailer::new(
//!         &config.patterns,
//!         config.exclude_regexes()?,
//!         config.idle_timeout(),
//!     )?;
//!
//!     tailer.run(
//!         |_path, line| store.record_hit(line),
//!         config.check_period(),
//!         |now| {
//!             let _ = store.sweep(now);
//!         },
//!     )
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`inotify`] - Kernel change-notification channel
//! - [`lock`] - File locking, one monitor per store
//! - [`pattern`] - Brace expansion for watch patterns
//! - [`store`] - Durable per-address block records
//! - [`tailer`] - Log tailing with a rotation-safe handle cache
//! - [`utils`] - Common formatting and time helpers
//! - [`validation`] - Address token validation

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod inotify;
pub mod lock;
pub mod pattern;
pub mod store;
pub mod tailer;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
