//! Metadata and permission inspection for files handled by the stream cursors.
//!
//! Writers delegate `size`/`modified`/`created` here and readers use
//! [`file_size`] when they first open a path. Everything is a thin pass-through
//! to `std::fs::metadata`; failures surface as [`StreamError::Access`] with
//! [`AccessOp::Stat`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use crate::fs_op::error::{AccessContext, AccessOp, Result};

/// Snapshot of a path's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
    /// Permission bits as a zero-padded octal string, e.g. `"0644"`.
    pub permissions: String,
    /// `ls -l` style permission string, e.g. `"-rw-r--r--"`.
    pub mode: String,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl FileMetadata {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path).access(path, AccessOp::Stat)?;
        let modified = meta.modified().access(path, AccessOp::Stat)?;
        let raw_mode = mode_bits(&meta);
        Ok(FileMetadata {
            path: path.to_path_buf(),
            size: meta.len(),
            modified: DateTime::<Utc>::from(modified),
            created: DateTime::<Utc>::from(created_or_changed(&meta, modified)),
            permissions: format!("{:04o}", raw_mode & 0o7777),
            mode: format_unix_mode(raw_mode, meta.is_dir()),
            uid: owner(&meta).map(|(u, _)| u),
            gid: owner(&meta).map(|(_, g)| g),
        })
    }
}

/// Size of `path` in bytes.
pub fn file_size<P: AsRef<Path>>(path: P) -> Result<u64> {
    let path = path.as_ref();
    Ok(fs::metadata(path).access(path, AccessOp::Stat)?.len())
}

/// Last modification time of `path`.
pub fn modification_time<P: AsRef<Path>>(path: P) -> Result<DateTime<Utc>> {
    let path = path.as_ref();
    let meta = fs::metadata(path).access(path, AccessOp::Stat)?;
    Ok(meta.modified().access(path, AccessOp::Stat)?.into())
}

/// Creation time of `path`.
///
/// On Unix this is the inode change time, which is what most filesystems
/// can actually report; elsewhere the platform birth time is used.
pub fn creation_time<P: AsRef<Path>>(path: P) -> Result<DateTime<Utc>> {
    let path = path.as_ref();
    let meta = fs::metadata(path).access(path, AccessOp::Stat)?;
    let modified = meta.modified().access(path, AccessOp::Stat)?;
    Ok(created_or_changed(&meta, modified).into())
}

/// Octal permission string (`"0644"`) for `path`.
pub fn permissions_octal<P: AsRef<Path>>(path: P) -> Result<String> {
    Ok(FileMetadata::read(path)?.permissions)
}

/// Human readable permission string (`"-rw-r--r--"`) for `path`.
pub fn permissions_human<P: AsRef<Path>>(path: P) -> Result<String> {
    Ok(FileMetadata::read(path)?.mode)
}

/// Render permission bits the way `ls -l` does.
pub fn format_unix_mode(mode: u32, is_dir: bool) -> String {
    let mut out = String::with_capacity(10);
    out.push(if is_dir { 'd' } else { '-' });
    let triplets = [(mode >> 6) & 0o7, (mode >> 3) & 0o7, mode & 0o7];
    let specials = [
        (mode & 0o4000 != 0, 's', 'S'),
        (mode & 0o2000 != 0, 's', 'S'),
        (mode & 0o1000 != 0, 't', 'T'),
    ];
    for (bits, (special, set, unset)) in triplets.iter().zip(specials) {
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        let exec = bits & 0o1 != 0;
        out.push(match (special, exec) {
            (true, true) => set,
            (true, false) => unset,
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}

#[cfg(unix)]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    meta.mode()
}

#[cfg(not(unix))]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

#[cfg(unix)]
fn created_or_changed(meta: &fs::Metadata, fallback: SystemTime) -> SystemTime {
    let secs = meta.ctime();
    let nanos = meta.ctime_nsec().clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + std::time::Duration::new(secs as u64, nanos)
    } else {
        fallback
    }
}

#[cfg(not(unix))]
fn created_or_changed(meta: &fs::Metadata, fallback: SystemTime) -> SystemTime {
    meta.created().unwrap_or(fallback)
}

#[cfg(unix)]
fn owner(meta: &fs::Metadata) -> Option<(u32, u32)> {
    Some((meta.uid(), meta.gid()))
}

#[cfg(not(unix))]
fn owner(_meta: &fs::Metadata) -> Option<(u32, u32)> {
    None
}
