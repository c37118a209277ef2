//! Configuration management for blocktail.

use anyhow::{Context, Result};
use ipnet::IpNet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validation::parse_ip_or_net;

/// Thirty days, the default forget timeout for decayed records.
const DEFAULT_FORGET_SECS: u64 = 30 * 86_400;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Glob patterns (brace alternatives allowed) selecting log files to tail
    pub patterns: Vec<String>,

    /// Regular expressions excluding resolved paths from tailing
    pub excludes: Vec<String>,

    /// Directory holding one record file per tracked address (must pre-exist)
    pub store_dir: PathBuf,

    /// Initial block duration in seconds
    pub block_secs: u32,

    /// Multiplier applied to the duration when a decayed record is revived
    pub backoff: f64,

    /// Sweep period in seconds (default: half of block_secs)
    pub check_secs: Option<u64>,

    /// Age after which a decayed record is deleted outright
    pub forget_secs: u64,

    /// Idle timeout in seconds for cached log file handles
    pub handle_idle_secs: u64,

    /// Addresses and networks that are never tracked
    pub allowlist: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patterns: vec!["/var/log/auth.log".to_string()],
            excludes: Vec::new(),
            store_dir: PathBuf::from("/var/lib/blocktail"),
            block_secs: 3600,
            backoff: 2.0,
            check_secs: None,
            forget_secs: DEFAULT_FORGET_SECS,
            handle_idle_secs: 3600,
            allowlist: default_allowlist(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config file at {:?}, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    /// Validate configuration values. Every failure here is fatal at
    /// startup, before any watching begins.
    pub fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            anyhow::bail!("No log patterns configured");
        }
        if self.block_secs == 0 {
            anyhow::bail!("block_secs must be greater than zero");
        }
        if self.backoff < 1.0 || !self.backoff.is_finite() {
            anyhow::bail!("backoff must be a finite multiplier >= 1.0, got {}", self.backoff);
        }
        if self.forget_secs == 0 {
            anyhow::bail!("forget_secs must be greater than zero");
        }
        if self.check_secs == Some(0) {
            anyhow::bail!("check_secs must be greater than zero");
        }
        if self.handle_idle_secs == 0 {
            anyhow::bail!("handle_idle_secs must be greater than zero");
        }
        if !self.store_dir.is_dir() {
            anyhow::bail!("Store directory does not exist: {}", self.store_dir.display());
        }
        for exclude in &self.excludes {
            Regex::new(exclude)
                .with_context(|| format!("Invalid exclude regex: {}", exclude))?;
        }
        for entry in &self.allowlist {
            parse_ip_or_net(entry)
                .with_context(|| format!("Invalid allowlist entry: {}", entry))?;
        }
        Ok(())
    }

    /// Save configuration to a YAML file atomically.
    ///
    /// Uses tempfile + rename so a crash never exposes a partial file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        let parent_dir = path.parent().unwrap_or(Path::new("."));
        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {:?}", path))?;

        Ok(())
    }

    /// Sweep period: configured value, or half the block duration.
    pub fn check_period(&self) -> Duration {
        let secs = self
            .check_secs
            .unwrap_or_else(|| (u64::from(self.block_secs) / 2).max(1));
        Duration::from_secs(secs)
    }

    /// Idle timeout for cached file handles.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.handle_idle_secs)
    }

    /// Compile the exclude regular expressions.
    pub fn exclude_regexes(&self) -> Result<Vec<Regex>> {
        self.excludes
            .iter()
            .map(|e| Regex::new(e).with_context(|| format!("Invalid exclude regex: {}", e)))
            .collect()
    }

    /// Parse the allowlist into networks.
    pub fn allow_nets(&self) -> Result<Vec<IpNet>> {
        self.allowlist
            .iter()
            .map(|e| parse_ip_or_net(e).with_context(|| format!("Invalid allowlist entry: {}", e)))
            .collect()
    }
}

fn default_allowlist() -> Vec<String> {
    vec![
        "127.0.0.0/8".to_string(), // Loopback
        "::1/128".to_string(),     // IPv6 loopback
    ]
}
