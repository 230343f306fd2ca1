//! A single OS file handle guarded by an advisory lock.
//!
//! [`LockedFile`] is created empty and opens its path lazily on first use.
//! It holds at most one lock at a time; acquiring a different kind releases
//! the old one first. The handle and its lock are released by [`LockedFile::close`]
//! or, failing that, when the value is dropped.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::fs_op::error::{AccessContext, AccessOp, Result, StreamError};
use crate::fs_op::stat::{containing_dir, ensure_streamable};

/// How the underlying handle is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the path must exist.
    Read,
    /// Write-only, creating the file when missing. With `append` every write
    /// lands at the end of the file.
    Write { append: bool },
}

/// Kind of advisory lock to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

/// Lock currently held by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    SharedLocked,
    ExclusiveLocked,
}

impl LockState {
    fn held(self) -> Option<LockKind> {
        match self {
            LockState::Unlocked => None,
            LockState::SharedLocked => Some(LockKind::Shared),
            LockState::ExclusiveLocked => Some(LockKind::Exclusive),
        }
    }
}

impl From<LockKind> for LockState {
    fn from(kind: LockKind) -> Self {
        match kind {
            LockKind::Shared => LockState::SharedLocked,
            LockKind::Exclusive => LockState::ExclusiveLocked,
        }
    }
}

/// Retry policy for lock acquisition.
///
/// Every attempt is non-blocking. With `wait` set, a contended lock is retried
/// up to `retries` more times, sleeping `delay` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub wait: bool,
    pub retries: u32,
    pub delay: Duration,
}

impl LockOptions {
    /// A single non-blocking attempt.
    pub const fn no_wait() -> Self {
        LockOptions {
            wait: false,
            retries: 0,
            delay: Duration::from_millis(0),
        }
    }

    pub const fn waiting(retries: u32, delay: Duration) -> Self {
        LockOptions {
            wait: true,
            retries,
            delay,
        }
    }

    fn attempts(&self) -> u32 {
        if self.wait {
            self.retries.saturating_add(1)
        } else {
            1
        }
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        LockOptions::no_wait()
    }
}

/// Exclusively owned file handle with advisory locking.
#[derive(Debug)]
pub struct LockedFile {
    path: PathBuf,
    mode: OpenMode,
    file: Option<File>,
    state: LockState,
}

impl LockedFile {
    /// Describe a handle for `path`; nothing is opened yet.
    pub fn new<P: Into<PathBuf>>(path: P, mode: OpenMode) -> Self {
        LockedFile {
            path: path.into(),
            mode,
            file: None,
            state: LockState::Unlocked,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    /// Open the OS handle. Calling this on an open handle is a no-op.
    pub fn open(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            ensure_streamable(&self.path).access(&self.path, AccessOp::Open)?;
            let mut options = OpenOptions::new();
            match self.mode {
                OpenMode::Read => {
                    options.read(true);
                }
                OpenMode::Write { append: true } => {
                    options.append(true).create(true);
                }
                OpenMode::Write { append: false } => {
                    options.write(true).create(true);
                }
            }
            let file = options.open(&self.path).map_err(|e| {
                if matches!(self.mode, OpenMode::Write { .. }) {
                    tracing::debug!(
                        dir = %containing_dir(&self.path).display(),
                        "cannot create or open for writing: {}",
                        e
                    );
                }
                StreamError::access(&self.path, AccessOp::Open, e)
            })?;
            tracing::debug!(path = %self.path.display(), mode = ?self.mode, "opened handle");
            self.file = Some(file);
        }
        self.file_mut()
    }

    /// Borrow the open handle.
    pub fn file_mut(&mut self) -> Result<&mut File> {
        match self.file.as_mut() {
            Some(f) => Ok(f),
            None => Err(StreamError::access(
                &self.path,
                AccessOp::Read,
                io::Error::new(io::ErrorKind::NotConnected, "handle is not open"),
            )),
        }
    }

    /// Duplicate the open handle. The clone shares the file offset and lock.
    pub fn try_clone(&self) -> Result<File> {
        match self.file.as_ref() {
            Some(f) => f.try_clone().access(&self.path, AccessOp::Open),
            None => Err(StreamError::access(
                &self.path,
                AccessOp::Open,
                io::Error::new(io::ErrorKind::NotConnected, "handle is not open"),
            )),
        }
    }

    /// Acquire `kind`, opening the handle first if needed.
    ///
    /// Holding the same kind already is a no-op. Holding the other kind
    /// releases it before the new lock is requested.
    pub fn acquire(&mut self, kind: LockKind, options: LockOptions) -> Result<()> {
        self.open()?;
        match self.state.held() {
            Some(held) if held == kind => return Ok(()),
            Some(_) => self.release()?,
            None => {}
        }

        let attempts = options.attempts();
        let mut last_err = None;
        for attempt in 1..=attempts {
            match sys::try_lock(self.file_mut()?, kind) {
                Ok(()) => {
                    self.state = kind.into();
                    tracing::debug!(path = %self.path.display(), ?kind, attempt, "lock acquired");
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tracing::trace!(path = %self.path.display(), attempt, attempts, "lock contended");
                    last_err = Some(e);
                    if attempt < attempts && !options.delay.is_zero() {
                        thread::sleep(options.delay);
                    }
                }
                Err(e) => return Err(StreamError::access(&self.path, AccessOp::Lock, e)),
            }
        }
        let source = last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::WouldBlock));
        Err(StreamError::access(&self.path, AccessOp::Lock, source))
    }

    /// Release the held lock. No-op when nothing is held.
    pub fn release(&mut self) -> Result<()> {
        if self.state == LockState::Unlocked {
            return Ok(());
        }
        if let Some(file) = self.file.as_ref() {
            sys::unlock(file).access(&self.path, AccessOp::Unlock)?;
        }
        tracing::debug!(path = %self.path.display(), "lock released");
        self.state = LockState::Unlocked;
        Ok(())
    }

    /// Release any lock, then drop the OS handle. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        let released = self.release();
        if self.file.take().is_some() {
            tracing::debug!(path = %self.path.display(), "closed handle");
        }
        // The descriptor is gone either way, and with it any flock.
        self.state = LockState::Unlocked;
        released
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("releasing {} on drop failed: {}", self.path.display(), e);
        }
    }
}

#[cfg(unix)]
mod sys {
    use super::LockKind;
    use nix::errno::Errno;
    use nix::fcntl::{flock, FlockArg};
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    fn to_io(e: Errno) -> io::Error {
        io::Error::from_raw_os_error(e as i32)
    }

    pub(super) fn try_lock(file: &File, kind: LockKind) -> io::Result<()> {
        let arg = match kind {
            LockKind::Shared => FlockArg::LockSharedNonblock,
            LockKind::Exclusive => FlockArg::LockExclusiveNonblock,
        };
        flock(file.as_raw_fd(), arg).map_err(to_io)
    }

    pub(super) fn unlock(file: &File) -> io::Result<()> {
        flock(file.as_raw_fd(), FlockArg::Unlock).map_err(to_io)
    }
}

#[cfg(not(unix))]
mod sys {
    use super::LockKind;
    use std::fs::File;
    use std::io;

    // Advisory locks are only implemented for flock-capable platforms.
    pub(super) fn try_lock(_file: &File, kind: LockKind) -> io::Result<()> {
        tracing::debug!(?kind, "advisory locking unsupported on this platform");
        Ok(())
    }

    pub(super) fn unlock(_file: &File) -> io::Result<()> {
        Ok(())
    }
}
