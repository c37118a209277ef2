//! Durable per-address block records.
//!
//! The store is a plain one-file-per-address directory: crash-simplicity
//! comes from atomic filesystem primitives (write-then-rename publish,
//! rename for stage transitions) instead of a transactional database, and
//! the corruption blast radius stays at one record.
//!
//! On-disk record layout (all integers big-endian):
//!
//! ```text
//! [1 byte:  version]          -- current version is 1
//! [4 bytes: start (u32)]      -- block start, Unix seconds
//! [4 bytes: duration (u32)]   -- block duration, seconds
//! [4 bytes: CRC32]            -- checksum of the 9 header bytes
//! ```
//!
//! A record lives at `<store-dir>/<address-token>` while active and is
//! renamed to `<store-dir>/<address-token>.pre` once its duration elapses
//! without a new hit. Decayed records keep their duration so a later hit
//! can revive them with backoff; decayed records older than the forget
//! timeout are deleted by the sweep.

use anyhow::{Context, Result};
use ipnet::IpNet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::BlocktailError;
use crate::utils::{now_secs, truncate};
use crate::validation::parse_address_token;

/// Current record format version.
pub const RECORD_VERSION: u8 = 1;

/// Encoded record size: version + start + duration + CRC32.
pub const RECORD_LEN: usize = 13;

/// Filename suffix marking a record in the decayed stage.
pub const DECAYED_SUFFIX: &str = ".pre";

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// One address's block state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    /// Block start, Unix seconds.
    pub start: u32,
    /// Block duration in seconds.
    pub duration: u32,
}

impl BlockRecord {
    /// Serialize to the fixed on-disk layout.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0] = RECORD_VERSION;
        buf[1..5].copy_from_slice(&self.start.to_be_bytes());
        buf[5..9].copy_from_slice(&self.duration.to_be_bytes());
        let crc = crc32fast::hash(&buf[..9]);
        buf[9..13].copy_from_slice(&crc.to_be_bytes());
        buf
    }

    /// Deserialize and verify a record.
    pub fn decode(bytes: &[u8]) -> Result<Self, BlocktailError> {
        if bytes.len() < RECORD_LEN {
            return Err(BlocktailError::RecordTooShort(bytes.len()));
        }
        let version = bytes[0];
        if version > RECORD_VERSION {
            return Err(BlocktailError::RecordVersion(version));
        }
        if crc32fast::hash(&bytes[..9]) != be_u32(&bytes[9..13]) {
            return Err(BlocktailError::RecordChecksum);
        }
        Ok(Self {
            start: be_u32(&bytes[1..5]),
            duration: be_u32(&bytes[5..9]),
        })
    }

    /// Unix second at which the block expires.
    pub fn expires_at(&self) -> u64 {
        u64::from(self.start) + u64::from(self.duration)
    }

    /// Whether the block duration has fully elapsed at `now`.
    pub fn is_expired(&self, now: u32) -> bool {
        self.expires_at() <= u64::from(now)
    }
}

/// Aggregate counters reported by [`BlockStore::sweep`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Record files examined.
    pub scanned: usize,
    /// Records left in the decayed stage when the pass ended.
    pub decayed: usize,
    /// Active records moved to the decayed stage by this pass.
    pub newly_decayed: usize,
    /// Decayed records deleted by this pass.
    pub forgotten: usize,
}

/// A record snapshot as returned by [`BlockStore::entries`].
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// Address token exactly as captured from the log line.
    pub token: String,
    pub record: BlockRecord,
    /// Whether the record is in the decayed stage.
    pub decayed: bool,
}

enum Loaded {
    Valid(BlockRecord),
    Missing,
    Corrupt(BlocktailError),
}

/// The per-address record store.
///
/// Addresses are independent files, so hits never need cross-address
/// locking; concurrent external readers see whole records only, never a
/// torn one.
pub struct BlockStore {
    dir: PathBuf,
    base_secs: u32,
    backoff: f64,
    forget_secs: u64,
    allow: Vec<IpNet>,
}

impl BlockStore {
    /// Open the store described by `config`. The store directory must
    /// pre-exist; a missing directory is a startup error, not something
    /// to create silently on a possibly mistyped path.
    pub fn open(config: &Config) -> Result<Self> {
        if !config.store_dir.is_dir() {
            anyhow::bail!(
                "Store directory does not exist: {}",
                config.store_dir.display()
            );
        }
        Ok(Self {
            dir: config.store_dir.clone(),
            base_secs: config.block_secs,
            backoff: config.backoff,
            forget_secs: config.forget_secs,
            allow: config.allow_nets()?,
        })
    }

    /// Apply one log line against the store.
    ///
    /// The first whitespace-delimited token must be an IPv4 or
    /// bracket-optional IPv6 literal; anything else is discarded with a
    /// diagnostic. Never fails the caller: per-record problems are logged
    /// and recovery is record-scoped.
    pub fn record_hit(&self, line: &str) {
        self.record_hit_at(line, now_secs());
    }

    /// Apply one log line at an explicit timestamp.
    pub fn record_hit_at(&self, line: &str, now: u32) {
        let Some(token) = line.split_whitespace().next() else {
            return;
        };
        let addr = match parse_address_token(token) {
            Ok(addr) => addr,
            Err(_) => {
                debug!("Ignoring line without address token: {}", truncate(line, 80));
                return;
            }
        };
        if self.allow.iter().any(|net| net.contains(&addr)) {
            debug!("Address {} is allowlisted, not tracking", token);
            return;
        }
        if let Err(e) = self.apply_hit(token, now) {
            warn!("Failed to update record for {}: {:#}", token, e);
        }
    }

    fn apply_hit(&self, token: &str, now: u32) -> Result<()> {
        let active = self.dir.join(token);
        let decayed = self.decayed_path(token);

        // A decayed twin is promoted back to the active name on load.
        let mut revived = false;
        if !active.exists() && decayed.exists() {
            fs::rename(&decayed, &active)
                .with_context(|| format!("Failed to promote decayed record for {}", token))?;
            revived = true;
        }

        let duration = match self.load(&active) {
            Loaded::Valid(rec) if revived => {
                let next = scale_duration(rec.duration, self.backoff);
                info!("Reviving block for {}: {}s -> {}s", token, rec.duration, next);
                next
            }
            Loaded::Valid(rec) => {
                debug!("Renewing block for {} ({}s)", token, rec.duration);
                rec.duration
            }
            Loaded::Missing => {
                info!("Blocking {} for {}s", token, self.base_secs);
                self.base_secs
            }
            Loaded::Corrupt(err) => {
                warn!(
                    "Corrupt record for {} ({}), rebuilding with {}s",
                    token, err, self.base_secs
                );
                self.base_secs
            }
        };

        self.write_record(&active, &BlockRecord { start: now, duration })
    }

    /// One pass over the store: age expired active records into the
    /// decayed stage, delete decayed records past the forget timeout, and
    /// rebuild anything corrupt at the default duration.
    pub fn sweep(&self, now: u32) -> Result<SweepStats> {
        let mut stats = SweepStats::default();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read store directory {}", self.dir.display()))?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable store entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            // Hidden names are in-flight temp files, not records.
            if name.starts_with('.') || !path.is_file() {
                continue;
            }
            stats.scanned += 1;

            if let Some(token) = name.strip_suffix(DECAYED_SUFFIX) {
                self.sweep_decayed(&path, token, now, &mut stats);
            } else {
                self.sweep_active(&path, &name, now, &mut stats);
            }
        }
        Ok(stats)
    }

    fn sweep_decayed(&self, path: &Path, token: &str, now: u32, stats: &mut SweepStats) {
        match self.load(path) {
            Loaded::Valid(rec)
                if u64::from(now).saturating_sub(u64::from(rec.start)) > self.forget_secs =>
            {
                match fs::remove_file(path) {
                    Ok(()) => {
                        debug!("Forgot decayed record for {}", token);
                        stats.forgotten += 1;
                    }
                    Err(e) => {
                        warn!("Failed to forget record for {}: {}", token, e);
                        stats.decayed += 1;
                    }
                }
            }
            Loaded::Valid(_) => stats.decayed += 1,
            Loaded::Missing => {}
            Loaded::Corrupt(err) => {
                warn!(
                    "Corrupt decayed record for {} ({}), rebuilding with {}s",
                    token, err, self.base_secs
                );
                let rec = BlockRecord {
                    start: now,
                    duration: self.base_secs,
                };
                if let Err(e) = self.write_record(path, &rec) {
                    warn!("Failed to rebuild record for {}: {:#}", token, e);
                }
                stats.decayed += 1;
            }
        }
    }

    fn sweep_active(&self, path: &Path, token: &str, now: u32, stats: &mut SweepStats) {
        match self.load(path) {
            Loaded::Valid(rec) if rec.is_expired(now) => {
                match fs::rename(path, self.decayed_path(token)) {
                    Ok(()) => {
                        debug!("Block for {} expired, decaying", token);
                        stats.newly_decayed += 1;
                        stats.decayed += 1;
                    }
                    Err(e) => warn!("Failed to decay record for {}: {}", token, e),
                }
            }
            Loaded::Valid(_) => {}
            Loaded::Missing => {}
            Loaded::Corrupt(err) => {
                warn!(
                    "Corrupt record for {} ({}), rebuilding with {}s",
                    token, err, self.base_secs
                );
                let rec = BlockRecord {
                    start: now,
                    duration: self.base_secs,
                };
                if let Err(e) = self.write_record(path, &rec) {
                    warn!("Failed to rebuild record for {}: {:#}", token, e);
                }
            }
        }
    }

    /// Look up the record for an address token, active stage first.
    pub fn lookup(&self, token: &str) -> Result<Option<StoreEntry>> {
        for (path, decayed) in [
            (self.dir.join(token), false),
            (self.decayed_path(token), true),
        ] {
            match self.load(&path) {
                Loaded::Valid(record) => {
                    return Ok(Some(StoreEntry {
                        token: token.to_string(),
                        record,
                        decayed,
                    }))
                }
                Loaded::Missing => {}
                Loaded::Corrupt(err) => {
                    return Err(err).with_context(|| format!("Record for {} is corrupt", token))
                }
            }
        }
        Ok(None)
    }

    /// Snapshot every readable record, sorted by token.
    pub fn entries(&self) -> Result<Vec<StoreEntry>> {
        let mut out = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read store directory {}", self.dir.display()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || !path.is_file() {
                continue;
            }
            let (token, decayed) = match name.strip_suffix(DECAYED_SUFFIX) {
                Some(token) => (token.to_string(), true),
                None => (name.to_string(), false),
            };
            match self.load(&path) {
                Loaded::Valid(record) => out.push(StoreEntry {
                    token,
                    record,
                    decayed,
                }),
                Loaded::Missing => {}
                Loaded::Corrupt(err) => warn!("Skipping corrupt record for {}: {}", token, err),
            }
        }
        out.sort_by(|a, b| a.token.cmp(&b.token));
        Ok(out)
    }

    /// Delete any record for an address token. Returns whether one existed.
    pub fn forget(&self, token: &str) -> Result<bool> {
        let mut removed = false;
        for path in [self.dir.join(token), self.decayed_path(token)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
        }
        Ok(removed)
    }

    fn decayed_path(&self, token: &str) -> PathBuf {
        self.dir.join(format!("{}{}", token, DECAYED_SUFFIX))
    }

    fn load(&self, path: &Path) -> Loaded {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Loaded::Missing,
            Err(e) => return Loaded::Corrupt(BlocktailError::RecordIo(e)),
        };
        match BlockRecord::decode(&bytes) {
            Ok(rec) => Loaded::Valid(rec),
            Err(err) => Loaded::Corrupt(err),
        }
    }

    /// Write-then-publish: the record appears under its final name only as
    /// a complete file, so an external reader never sees a torn record.
    fn write_record(&self, path: &Path, record: &BlockRecord) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .context("Failed to create temporary record file")?;
        tmp.write_all(&record.encode())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .with_context(|| format!("Failed to publish record {}", path.display()))?;
        Ok(())
    }
}

fn scale_duration(duration: u32, backoff: f64) -> u32 {
    (f64::from(duration) * backoff)
        .round()
        .clamp(1.0, f64::from(u32::MAX)) as u32
}
