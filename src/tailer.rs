//! Stateful log tailing over the notification channel.
//!
//! The tailer owns the watch set and an open-file-handle cache keyed by
//! `(device, inode)` rather than path, so rename-based rotation never loses
//! in-flight file identity: a rotated file keeps its handle and read
//! offset, while a new file at the old path gets a fresh handle starting
//! at its own end-of-file. Idle handles are evicted on a cadence of half
//! the configured idle timeout and lazily reopened on next access.

use anyhow::{Context, Result};
use glob::Pattern;
use regex::Regex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::inotify::{Event, Notifier, CREATE_MODIFY};
use crate::pattern::expand_braces;
use crate::utils::now_secs;

/// A watched directory and its accumulated file-name patterns.
struct Watch {
    dir: PathBuf,
    patterns: Vec<Pattern>,
}

/// An open log file positioned at the current read offset.
struct CachedHandle {
    file: File,
    last_used: Instant,
}

/// Tails every file matched by the configured glob patterns, yielding
/// newly appended lines per filesystem event.
pub struct Tailer {
    notifier: Notifier,
    /// Decoded-event-to-watch mapping, keyed by kernel watch descriptor.
    watches: HashMap<i32, Watch>,
    /// Canonical directory to watch descriptor, for the containment check.
    dirs: HashMap<PathBuf, i32>,
    handles: HashMap<(u64, u64), CachedHandle>,
    excludes: Vec<Regex>,
    idle_timeout: Duration,
    last_evict: Instant,
}

impl Tailer {
    /// Resolve the patterns into directory watches and open the
    /// notification channel.
    ///
    /// Directories that do not exist are skipped with a diagnostic; having
    /// no watchable directory at all is a startup error.
    pub fn new(patterns: &[String], excludes: Vec<Regex>, idle_timeout: Duration) -> Result<Self> {
        let mut tailer = Self {
            notifier: Notifier::open()?,
            watches: HashMap::new(),
            dirs: HashMap::new(),
            handles: HashMap::new(),
            excludes,
            idle_timeout,
            last_evict: Instant::now(),
        };

        for raw in patterns {
            for pattern in expand_braces(raw) {
                tailer.add_pattern(&pattern)?;
            }
        }

        if tailer.watches.is_empty() {
            anyhow::bail!("No watchable directories for the configured patterns");
        }
        Ok(tailer)
    }

    /// Number of directories currently watched.
    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    fn add_pattern(&mut self, pattern: &str) -> Result<()> {
        let mut targets: Vec<(PathBuf, String)> = Vec::new();

        // A pattern that itself names directories watches everything inside.
        for path in glob::glob(pattern)
            .with_context(|| format!("Invalid pattern: {}", pattern))?
            .flatten()
        {
            if path.is_dir() {
                targets.push((path, "*".to_string()));
            }
        }

        // Otherwise glob the parent and keep the file component as the
        // per-directory name pattern.
        if targets.is_empty() {
            let path = Path::new(pattern);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "*".to_string());
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
                _ => ".".to_string(),
            };
            for dir in glob::glob(&parent)
                .with_context(|| format!("Invalid pattern: {}", pattern))?
                .flatten()
            {
                if dir.is_dir() {
                    targets.push((dir, name.clone()));
                }
            }
        }

        if targets.is_empty() {
            info!("No existing directory matches pattern {}, skipping", pattern);
            return Ok(());
        }

        for (dir, name_pattern) in targets {
            let real = match fs::canonicalize(&dir) {
                Ok(p) => p,
                Err(e) => {
                    info!("Skipping unresolvable directory {}: {}", dir.display(), e);
                    continue;
                }
            };
            let compiled = Pattern::new(&name_pattern)
                .with_context(|| format!("Invalid file pattern: {}", name_pattern))?;

            match self.dirs.entry(real.clone()) {
                Entry::Occupied(entry) => {
                    if let Some(watch) = self.watches.get_mut(entry.get()) {
                        if !watch.patterns.contains(&compiled) {
                            watch.patterns.push(compiled);
                        }
                    }
                }
                Entry::Vacant(slot) => {
                    let wd = self.notifier.add_watch(&real, CREATE_MODIFY)?;
                    debug!("Watching {} for {}", real.display(), name_pattern);
                    slot.insert(wd);
                    self.watches.insert(
                        wd,
                        Watch {
                            dir: real,
                            patterns: vec![compiled],
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Drive the tail loop forever.
    ///
    /// Blocks on the notification channel with a deadline derived from
    /// `period`; whenever the deadline elapses, `on_period` runs with the
    /// current Unix time and the deadline is rescheduled. Each newly
    /// appended line is handed to `on_line` in append order. The loop has
    /// no exit condition of its own: termination is whole-process, and
    /// every OS resource held here is scoped.
    pub fn run<L, P>(&mut self, mut on_line: L, period: Duration, mut on_period: P) -> Result<()>
    where
        L: FnMut(&Path, &str),
        P: FnMut(u32),
    {
        let mut deadline = Instant::now() + period;
        loop {
            let timeout = deadline.saturating_duration_since(Instant::now());
            let ready = self.notifier.poll(Some(timeout))?;
            if Instant::now() >= deadline {
                on_period(now_secs());
                deadline = Instant::now() + period;
            }
            self.maybe_evict();
            if ready {
                for (path, line) in self.drain()? {
                    on_line(&path, &line);
                }
            }
        }
    }

    /// One poll/drain cycle: wait up to `timeout` for events and return
    /// the newly appended lines, in append order.
    pub fn poll_once(&mut self, timeout: Duration) -> Result<Vec<(PathBuf, String)>> {
        let ready = self.notifier.poll(Some(timeout))?;
        self.maybe_evict();
        if ready {
            self.drain()
        } else {
            Ok(Vec::new())
        }
    }

    fn drain(&mut self) -> Result<Vec<(PathBuf, String)>> {
        let mut out = Vec::new();
        for event in self.notifier.read()? {
            if event.name.is_empty() {
                continue;
            }
            self.handle_event(&event, &mut out);
        }
        Ok(out)
    }

    fn handle_event(&mut self, event: &Event, out: &mut Vec<(PathBuf, String)>) {
        let Some(watch) = self.watches.get(&event.wd) else {
            return;
        };
        let path = watch.dir.join(&event.name);

        // Resolve before reading so rename races surface here, not mid-read.
        let real = match fs::canonicalize(&path) {
            Ok(p) => p,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                return;
            }
        };
        let meta = match fs::metadata(&real) {
            Ok(m) => m,
            Err(e) => {
                debug!("Skipping {}: {}", real.display(), e);
                return;
            }
        };
        if !meta.is_file() {
            return;
        }

        let Some(parent) = real.parent().map(Path::to_path_buf) else {
            return;
        };
        let Some(&wd) = self.dirs.get(&parent) else {
            debug!("Skipping {}: outside the watch set", real.display());
            return;
        };
        let name = match real.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => return,
        };
        let matched = self
            .watches
            .get(&wd)
            .map(|w| w.patterns.iter().any(|p| p.matches(&name)))
            .unwrap_or(false);
        if !matched {
            debug!("Skipping {}: no pattern match", real.display());
            return;
        }
        let real_str = real.to_string_lossy().into_owned();
        if let Some(rx) = self.excludes.iter().find(|rx| rx.is_match(&real_str)) {
            debug!("Skipping {}: excluded by /{}/", real.display(), rx.as_str());
            return;
        }

        let key = (meta.dev(), meta.ino());
        match self.read_lines(key, &real, meta.len()) {
            Ok(lines) => out.extend(lines.into_iter().map(|l| (real.clone(), l))),
            Err(e) => {
                debug!("Skipping read of {}: {}", real.display(), e);
                self.handles.remove(&key);
            }
        }
    }

    fn read_lines(
        &mut self,
        key: (u64, u64),
        path: &Path,
        current_len: u64,
    ) -> io::Result<Vec<String>> {
        let now = Instant::now();
        let handle = match self.handles.entry(key) {
            Entry::Vacant(slot) => {
                // First observation: tail from end-of-file, never history.
                let mut file = File::open(path)?;
                file.seek(SeekFrom::End(0))?;
                debug!("Opened {} (dev {}, inode {})", path.display(), key.0, key.1);
                slot.insert(CachedHandle {
                    file,
                    last_used: now,
                });
                return Ok(Vec::new());
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };
        handle.last_used = now;

        let pos = handle.file.stream_position()?;
        if current_len < pos {
            debug!(
                "{} truncated ({} -> {} bytes), rewinding",
                path.display(),
                pos,
                current_len
            );
            handle.file.seek(SeekFrom::Start(0))?;
        }

        let mut buf = Vec::new();
        handle.file.read_to_end(&mut buf)?;
        if buf.is_empty() {
            return Ok(Vec::new());
        }

        let mut lines = Vec::new();
        let mut consumed = 0usize;
        for segment in buf.split_inclusive(|&b| b == b'\n') {
            if segment.ends_with(b"\n") {
                consumed += segment.len();
                let text = String::from_utf8_lossy(&segment[..segment.len() - 1]);
                lines.push(text.trim_end_matches('\r').to_string());
            }
        }

        // Leave a trailing partial line unconsumed so it is delivered whole.
        let leftover = buf.len() - consumed;
        if leftover > 0 {
            handle.file.seek(SeekFrom::Current(-(leftover as i64)))?;
        }
        Ok(lines)
    }

    fn maybe_evict(&mut self) {
        if self.last_evict.elapsed() < self.idle_timeout / 2 {
            return;
        }
        self.last_evict = Instant::now();
        let before = self.handles.len();
        let idle = self.idle_timeout;
        self.handles.retain(|_, h| h.last_used.elapsed() <= idle);
        let evicted = before - self.handles.len();
        if evicted > 0 {
            debug!("Evicted {} idle file handle(s)", evicted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    const IDLE: Duration = Duration::from_secs(3600);
    const WAIT: Duration = Duration::from_secs(2);

    fn tailer_for(dir: &TempDir) -> Tailer {
        let pattern = format!("{}/*.log", dir.path().display());
        Tailer::new(&[pattern], Vec::new(), IDLE).unwrap()
    }

    fn append(path: &Path, data: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(data.as_bytes()).unwrap();
    }

    fn lines_of(batch: Vec<(PathBuf, String)>) -> Vec<String> {
        batch.into_iter().map(|(_, line)| line).collect()
    }

    #[test]
    fn test_appended_lines_delivered_in_order() {
        let dir = TempDir::new().unwrap();
        let mut tailer = tailer_for(&dir);
        let log = dir.path().join("a.log");

        fs::write(&log, "").unwrap();
        tailer.poll_once(WAIT).unwrap();

        append(&log, "one\ntwo\n");
        let lines = lines_of(tailer.poll_once(WAIT).unwrap());
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_preexisting_content_never_read() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("a.log");
        fs::write(&log, "old line\n").unwrap();

        let mut tailer = tailer_for(&dir);

        // The first event opens the handle at end-of-file, so content
        // appended before first observation is skipped.
        append(&log, "missed\n");
        let lines = lines_of(tailer.poll_once(WAIT).unwrap());
        assert!(lines.is_empty());

        append(&log, "seen\n");
        let lines = lines_of(tailer.poll_once(WAIT).unwrap());
        assert_eq!(lines, vec!["seen"]);
    }

    #[test]
    fn test_rotation_new_inode_starts_at_eof() {
        let dir = TempDir::new().unwrap();
        let mut tailer = tailer_for(&dir);
        let log = dir.path().join("a.log");

        fs::write(&log, "").unwrap();
        tailer.poll_once(WAIT).unwrap();
        append(&log, "before\n");
        assert_eq!(
            lines_of(tailer.poll_once(WAIT).unwrap()),
            vec!["before"]
        );

        // Rotate: rename away, then recreate the path with a new inode.
        fs::rename(&log, dir.path().join("a.log.rotated")).unwrap();
        fs::write(&log, "history\n").unwrap();
        tailer.poll_once(WAIT).unwrap();

        append(&log, "fresh\n");
        let lines = lines_of(tailer.poll_once(WAIT).unwrap());
        assert_eq!(lines, vec!["fresh"]);
    }

    #[test]
    fn test_truncation_rewinds_to_start() {
        let dir = TempDir::new().unwrap();
        let mut tailer = tailer_for(&dir);
        let log = dir.path().join("a.log");

        fs::write(&log, "").unwrap();
        tailer.poll_once(WAIT).unwrap();
        append(&log, "a longer first line\n");
        tailer.poll_once(WAIT).unwrap();

        // In-place truncation keeps the inode but shrinks below the cursor.
        fs::write(&log, "bb\n").unwrap();
        let lines = lines_of(tailer.poll_once(WAIT).unwrap());
        assert_eq!(lines, vec!["bb"]);
    }

    #[test]
    fn test_partial_line_held_until_complete() {
        let dir = TempDir::new().unwrap();
        let mut tailer = tailer_for(&dir);
        let log = dir.path().join("a.log");

        fs::write(&log, "").unwrap();
        tailer.poll_once(WAIT).unwrap();

        append(&log, "par");
        assert!(lines_of(tailer.poll_once(WAIT).unwrap()).is_empty());

        append(&log, "tial\n");
        let lines = lines_of(tailer.poll_once(WAIT).unwrap());
        assert_eq!(lines, vec!["partial"]);
    }

    #[test]
    fn test_unmatched_name_skipped() {
        let dir = TempDir::new().unwrap();
        let mut tailer = tailer_for(&dir);
        let other = dir.path().join("notes.txt");

        fs::write(&other, "").unwrap();
        tailer.poll_once(WAIT).unwrap();
        append(&other, "1.2.3.4 nope\n");

        assert!(lines_of(tailer.poll_once(WAIT).unwrap()).is_empty());
    }

    #[test]
    fn test_exclude_regex_skips_path() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*.log", dir.path().display());
        let exclude = Regex::new("skipme").unwrap();
        let mut tailer = Tailer::new(&[pattern], vec![exclude], IDLE).unwrap();
        let log = dir.path().join("skipme.log");

        fs::write(&log, "").unwrap();
        tailer.poll_once(WAIT).unwrap();
        append(&log, "1.2.3.4 hi\n");

        assert!(lines_of(tailer.poll_once(WAIT).unwrap()).is_empty());
    }

    #[test]
    fn test_brace_patterns_accumulate_on_one_watch() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/{{auth,secure}}.log", dir.path().display());
        let mut tailer = Tailer::new(&[pattern], Vec::new(), IDLE).unwrap();
        assert_eq!(tailer.watch_count(), 1);

        let auth = dir.path().join("auth.log");
        let secure = dir.path().join("secure.log");
        let mail = dir.path().join("mail.log");
        for f in [&auth, &secure, &mail] {
            fs::write(f, "").unwrap();
        }
        tailer.poll_once(WAIT).unwrap();

        append(&auth, "a\n");
        append(&secure, "s\n");
        append(&mail, "m\n");
        let mut lines = lines_of(tailer.poll_once(WAIT).unwrap());
        lines.sort();
        assert_eq!(lines, vec!["a", "s"]);
    }

    #[test]
    fn test_directory_pattern_watches_everything_inside() {
        let dir = TempDir::new().unwrap();
        let pattern = dir.path().display().to_string();
        let mut tailer = Tailer::new(&[pattern], Vec::new(), IDLE).unwrap();

        let any = dir.path().join("whatever.txt");
        fs::write(&any, "").unwrap();
        tailer.poll_once(WAIT).unwrap();
        append(&any, "x\n");

        assert_eq!(lines_of(tailer.poll_once(WAIT).unwrap()), vec!["x"]);
    }

    #[test]
    fn test_missing_directories_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let good = format!("{}/*.log", dir.path().display());
        let missing = "/nonexistent-blocktail-test/*.log".to_string();

        assert!(Tailer::new(&[good, missing], Vec::new(), IDLE).is_ok());
        assert!(Tailer::new(
            &["/nonexistent-blocktail-test/*.log".to_string()],
            Vec::new(),
            IDLE
        )
        .is_err());
    }
}
