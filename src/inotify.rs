//! Kernel change-notification channel.
//!
//! A thin, blocking-pollable wrapper around the Linux inotify primitives.
//! The channel descriptor is held as an [`OwnedFd`] so it is released on
//! every exit path, and all blocking syscalls transparently retry on
//! `EINTR`. The wrapper knows nothing about logs or blocking semantics;
//! it only registers directories and decodes raw event records.

use std::collections::HashSet;
use std::ffi::{CString, OsString};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::Path;
use std::time::Duration;

use crate::error::BlocktailError;

type Result<T> = std::result::Result<T, BlocktailError>;

/// Watch mask covering file creation, modification and rename-into-place.
pub const CREATE_MODIFY: u32 = libc::IN_CREATE | libc::IN_MODIFY | libc::IN_MOVED_TO;

/// One decoded inotify event record.
#[derive(Debug)]
pub struct Event {
    /// Kernel watch descriptor the event belongs to.
    pub wd: i32,
    /// Raw event flags (`IN_CREATE`, `IN_MODIFY`, ...).
    pub mask: u32,
    /// Cookie correlating the two halves of a rename.
    pub cookie: u32,
    /// Entry name relative to the watched directory; empty for events on
    /// the directory itself.
    pub name: OsString,
}

/// A pollable inotify channel with a known-watch set.
///
/// Records read from the kernel whose watch descriptor is not in the known
/// set (already removed, or the queue-overflow sentinel) are silently
/// discarded instead of failing the whole batch.
pub struct Notifier {
    fd: Option<OwnedFd>,
    known: HashSet<i32>,
}

impl Notifier {
    /// Acquire an inotify channel (close-on-exec, non-blocking reads).
    pub fn open() -> Result<Self> {
        // SAFETY: inotify_init1 returns a fresh descriptor or -1.
        let raw = unsafe { libc::inotify_init1(libc::IN_CLOEXEC | libc::IN_NONBLOCK) };
        if raw < 0 {
            return Err(BlocktailError::Notify(io::Error::last_os_error()));
        }
        // SAFETY: raw is a freshly acquired descriptor we own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(Self {
            fd: Some(fd),
            known: HashSet::new(),
        })
    }

    fn fd(&self) -> Result<&OwnedFd> {
        self.fd.as_ref().ok_or(BlocktailError::NotifyClosed)
    }

    /// Register interest in `path` for the events in `mask` and return the
    /// kernel watch descriptor.
    pub fn add_watch(&mut self, path: &Path, mask: u32) -> Result<i32> {
        let fd = self.fd()?.as_raw_fd();
        let cpath = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| BlocktailError::Config(format!("path contains NUL: {}", path.display())))?;

        let wd = loop {
            // SAFETY: fd is a live inotify descriptor, cpath is NUL-terminated.
            let rc = unsafe { libc::inotify_add_watch(fd, cpath.as_ptr(), mask) };
            if rc >= 0 {
                break rc;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(BlocktailError::Notify(err));
            }
        };

        self.known.insert(wd);
        Ok(wd)
    }

    /// Deregister a watch. Events already queued for it will be discarded
    /// by [`Notifier::read`].
    pub fn rm_watch(&mut self, wd: i32) -> Result<()> {
        let fd = self.fd()?.as_raw_fd();
        self.known.remove(&wd);
        // SAFETY: fd is a live inotify descriptor.
        let rc = unsafe { libc::inotify_rm_watch(fd, wd) };
        if rc < 0 {
            return Err(BlocktailError::Notify(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Block up to `timeout` (indefinitely when `None`) and report whether
    /// events are ready, without consuming them.
    pub fn poll(&self, timeout: Option<Duration>) -> Result<bool> {
        let fd = self.fd()?.as_raw_fd();
        let timeout_ms: libc::c_int = match timeout {
            None => -1,
            Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        loop {
            // SAFETY: pfd points at one valid pollfd for the whole call.
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc >= 0 {
                return Ok(rc > 0 && pfd.revents & libc::POLLIN != 0);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(BlocktailError::Notify(err));
            }
        }
    }

    /// Drain and decode all currently-available event records.
    ///
    /// Returns an empty batch when nothing is queued.
    pub fn read(&mut self) -> Result<Vec<Event>> {
        let fd = self.fd()?.as_raw_fd();
        let mut events = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            // SAFETY: buf is writable for buf.len() bytes.
            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => break,
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(BlocktailError::Notify(err)),
                }
            }
            if n == 0 {
                break;
            }
            self.decode(&buf[..n as usize], &mut events);
        }
        Ok(events)
    }

    /// Decode a raw buffer of concatenated, variable-length event records.
    fn decode(&self, buf: &[u8], out: &mut Vec<Event>) {
        const HEADER: usize = std::mem::size_of::<libc::inotify_event>();
        let mut offset = 0;
        while offset + HEADER <= buf.len() {
            // SAFETY: at least HEADER bytes remain at offset; the unaligned
            // read tolerates the packed record layout.
            let header: libc::inotify_event =
                unsafe { std::ptr::read_unaligned(buf[offset..].as_ptr().cast()) };
            let end = offset + HEADER + header.len as usize;
            if end > buf.len() {
                break;
            }
            let name_bytes = &buf[offset + HEADER..end];
            offset = end;

            // Watches removed earlier and the queue-overflow sentinel both
            // carry descriptors outside the known set; drop those records.
            if !self.known.contains(&header.wd) {
                continue;
            }

            // The kernel pads names with trailing NULs.
            let name = match name_bytes.iter().position(|&b| b == 0) {
                Some(i) => &name_bytes[..i],
                None => name_bytes,
            };
            out.push(Event {
                wd: header.wd,
                mask: header.mask,
                cookie: header.cookie,
                name: OsString::from_vec(name.to_vec()),
            });
        }
    }

    /// Release the channel. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        self.fd = None;
        self.known.clear();
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.close();
    }
}
