//! Format-aware appender guarded by an exclusive lock per call.
//!
//! Every encode operation opens the handle when needed, takes an exclusive
//! lock (unless the caller already holds one through [`StreamWriter::lock`]),
//! appends the encoded bytes and releases the lock again on every exit path.
//! Without `append`, the first write of each handle session truncates the
//! file.

use std::collections::BTreeMap;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::fs_op::error::{AccessContext, AccessOp, Result, StreamError};
use crate::fs_op::lock::{LockKind, LockOptions, LockState, LockedFile, OpenMode};
use crate::fs_op::metadata;
use crate::settings::Settings;
use crate::stream::encode;
use crate::stream::format::{CsvDialect, FormatKind};
use crate::stream::record::XmlElement;

/// Construction options for a [`StreamWriter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Keep existing content and add to the end.
    pub append: bool,
    /// Policy for the per-call lock.
    pub lock: LockOptions,
    pub pretty_json: bool,
    pub csv: CsvDialect,
}

impl WriterOptions {
    pub fn appending() -> Self {
        WriterOptions {
            append: true,
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &Settings, append: bool) -> Self {
        WriterOptions {
            append,
            lock: settings.lock.options(),
            pretty_json: settings.pretty_json,
            csv: settings.csv,
        }
    }
}

/// Snapshot of a writer for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriterSummary {
    pub filename: String,
    pub size: u64,
    pub writes: u64,
    pub tally: BTreeMap<String, u64>,
}

pub struct StreamWriter {
    handle: LockedFile,
    options: WriterOptions,
    session_started: bool,
    writes: u64,
    tally: BTreeMap<FormatKind, u64>,
}

impl StreamWriter {
    pub fn new<P: Into<PathBuf>>(path: P, append: bool) -> Self {
        Self::with_options(
            path,
            WriterOptions {
                append,
                ..Default::default()
            },
        )
    }

    pub fn with_options<P: Into<PathBuf>>(path: P, options: WriterOptions) -> Self {
        StreamWriter {
            handle: LockedFile::new(
                path,
                OpenMode::Write {
                    append: options.append,
                },
            ),
            options,
            session_started: false,
            writes: 0,
            tally: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn lock_state(&self) -> LockState {
        self.handle.state()
    }

    pub fn character(&mut self, c: char) -> Result<()> {
        let mut buf = [0u8; 4];
        let bytes = c.encode_utf8(&mut buf).as_bytes().to_vec();
        self.write_encoded(FormatKind::Character, |_| Ok(bytes))
    }

    /// Write `text` followed by the platform line terminator.
    pub fn line(&mut self, text: &str) -> Result<()> {
        self.write_encoded(FormatKind::Line, |_| Ok(encode::line(text)))
    }

    /// One delimited row in the writer's CSV dialect.
    pub fn csv<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.write_encoded(FormatKind::Csv, |o| encode::csv(fields, &o.csv))
    }

    /// One row from a serde value such as a tuple or a flat struct.
    pub fn csv_serialize<T: Serialize>(&mut self, row: &T) -> Result<()> {
        self.write_encoded(FormatKind::Csv, |o| encode::csv_serialize(row, &o.csv))
    }

    pub fn binary(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_encoded(FormatKind::Binary, |_| Ok(bytes.to_vec()))
    }

    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.write_encoded(FormatKind::Json, |o| encode::json(value, o.pretty_json))
    }

    /// Write `text` as a line only when it matches `pattern`.
    ///
    /// Returns `false`, without touching the file, when it does not.
    pub fn regex(&mut self, text: &str, pattern: &Regex) -> Result<bool> {
        if !pattern.is_match(text) {
            tracing::trace!(pattern = pattern.as_str(), "line rejected by pattern");
            return Ok(false);
        }
        self.write_encoded(FormatKind::Regex, |_| Ok(encode::line(text)))?;
        Ok(true)
    }

    pub fn fixed_width<S: AsRef<str>>(&mut self, fields: &[S], widths: &[usize]) -> Result<()> {
        self.write_encoded(FormatKind::FixedWidth, |_| encode::fixed_width(fields, widths))
    }

    pub fn xml(&mut self, element: &XmlElement) -> Result<()> {
        self.write_encoded(FormatKind::Xml, |_| encode::xml(element))
    }

    pub fn serialized<T: Serialize>(&mut self, value: &T) -> Result<()> {
        self.write_encoded(FormatKind::Serialized, |_| encode::serialized(value))
    }

    /// The whole slice as one JSON array document.
    pub fn json_array<T: Serialize>(&mut self, items: &[T]) -> Result<()> {
        self.write_encoded(FormatKind::JsonArray, |o| encode::json_array(items, o.pretty_json))
    }

    /// Hold a lock across several calls until [`unlock`](Self::unlock).
    pub fn lock(&mut self, kind: LockKind, options: LockOptions) -> Result<()> {
        self.handle.acquire(kind, options)
    }

    pub fn unlock(&mut self) -> Result<()> {
        self.handle.release()
    }

    /// Push written bytes down to storage. No-op before the first write.
    pub fn flush(&mut self) -> Result<()> {
        if !self.handle.is_open() {
            return Ok(());
        }
        let path = self.handle.path().to_path_buf();
        let file = self.handle.file_mut()?;
        file.flush().access(&path, AccessOp::Sync)?;
        file.sync_data().access(&path, AccessOp::Sync)
    }

    /// Resize the file to `size` bytes under the usual per-call lock.
    ///
    /// Counts as the session's first write, so a later write does not
    /// truncate again.
    pub fn truncate(&mut self, size: u64) -> Result<()> {
        self.guarded(|w| {
            let path = w.handle.path().to_path_buf();
            let file = w.handle.file_mut()?;
            file.set_len(size).access(&path, AccessOp::Truncate)?;
            if !w.options.append {
                file.seek(SeekFrom::Start(size)).access(&path, AccessOp::Seek)?;
            }
            w.session_started = true;
            tracing::debug!(path = %path.display(), size, "truncated");
            Ok(())
        })
    }

    /// Release any lock and drop the handle. The next write starts a new
    /// session.
    pub fn close(&mut self) -> Result<()> {
        self.session_started = false;
        self.handle.close()
    }

    pub fn size(&self) -> Result<u64> {
        metadata::file_size(self.path())
    }

    pub fn modified(&self) -> Result<DateTime<Utc>> {
        metadata::modification_time(self.path())
    }

    pub fn created(&self) -> Result<DateTime<Utc>> {
        metadata::creation_time(self.path())
    }

    /// Successful writes over the writer's lifetime.
    pub fn count(&self) -> u64 {
        self.writes
    }

    pub fn tally(&self) -> &BTreeMap<FormatKind, u64> {
        &self.tally
    }

    pub fn summary(&self) -> Result<WriterSummary> {
        let size = match self.size() {
            Ok(size) => size,
            Err(StreamError::Access { source, .. }) if source.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        let filename = self
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path().display().to_string());
        Ok(WriterSummary {
            filename,
            size,
            writes: self.writes,
            tally: self
                .tally
                .iter()
                .map(|(kind, n)| (kind.as_str().to_string(), *n))
                .collect(),
        })
    }

    /// Run `op` under an exclusive lock, unless the caller already holds
    /// one. A lock taken here is released whatever `op` returns.
    fn guarded<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.handle.state() != LockState::Unlocked {
            return op(self);
        }
        self.handle.acquire(LockKind::Exclusive, self.options.lock)?;
        let outcome = op(self);
        let released = self.handle.release();
        outcome.and_then(|v| released.map(|_| v))
    }

    fn write_encoded<F>(&mut self, kind: FormatKind, encode: F) -> Result<()>
    where
        F: FnOnce(&WriterOptions) -> Result<Vec<u8>>,
    {
        self.guarded(|w| {
            let bytes = encode(&w.options)?;
            w.begin_session()?;
            let path = w.handle.path().to_path_buf();
            w.handle
                .file_mut()?
                .write_all(&bytes)
                .access(&path, AccessOp::Write)?;
            w.writes += 1;
            *w.tally.entry(kind).or_insert(0) += 1;
            tracing::trace!(path = %path.display(), format = %kind, len = bytes.len(), "record written");
            Ok(())
        })
    }

    fn begin_session(&mut self) -> Result<()> {
        if self.session_started {
            return Ok(());
        }
        if !self.options.append {
            let path = self.handle.path().to_path_buf();
            let file = self.handle.file_mut()?;
            file.set_len(0).access(&path, AccessOp::Truncate)?;
            file.seek(SeekFrom::Start(0)).access(&path, AccessOp::Seek)?;
            tracing::debug!(path = %path.display(), "session truncated");
        }
        self.session_started = true;
        Ok(())
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("path", &self.path())
            .field("append", &self.options.append)
            .field("writes", &self.writes)
            .field("lock", &self.handle.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn construction_creates_nothing() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("new.txt");
        let w = StreamWriter::new(&p, false);
        assert!(!p.exists());
        assert_eq!(w.count(), 0);
        assert_eq!(w.summary().unwrap().size, 0);
    }

    #[test]
    fn every_call_leaves_the_file_unlocked() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("out.txt");
        let mut w = StreamWriter::new(&p, false);
        w.line("a").unwrap();
        assert_eq!(w.lock_state(), LockState::Unlocked);
        assert!(w.fixed_width(&["x"], &[1, 2]).is_err());
        assert_eq!(w.lock_state(), LockState::Unlocked);
        assert_eq!(w.count(), 1);
    }

    #[test]
    fn explicit_lock_survives_writes() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("held.txt");
        let mut w = StreamWriter::new(&p, true);
        w.lock(LockKind::Exclusive, LockOptions::no_wait()).unwrap();
        w.line("one").unwrap();
        w.line("two").unwrap();
        assert_eq!(w.lock_state(), LockState::ExclusiveLocked);
        w.unlock().unwrap();
        w.unlock().unwrap();
        assert_eq!(w.lock_state(), LockState::Unlocked);
    }

    #[test]
    fn regex_gate_skips_non_matching_lines() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("gate.txt");
        let mut w = StreamWriter::new(&p, false);
        let re = Regex::new(r"^\d+$").unwrap();
        assert!(!w.regex("abc", &re).unwrap());
        assert!(!p.exists());
        assert!(w.regex("42", &re).unwrap());
        assert_eq!(fs::read_to_string(&p).unwrap(), format!("42{}", crate::stream::format::LINE_ENDING));
        assert_eq!(w.count(), 1);
    }

    #[test]
    fn tally_tracks_mixed_formats() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("mix.txt");
        let mut w = StreamWriter::new(&p, false);
        w.line("x").unwrap();
        w.json(&serde_json::json!({"a": 1})).unwrap();
        w.line("y").unwrap();
        let s = w.summary().unwrap();
        assert_eq!(s.filename, "mix.txt");
        assert_eq!(s.writes, 3);
        assert_eq!(s.tally.get("line"), Some(&2));
        assert_eq!(s.tally.get("json"), Some(&1));
        assert_eq!(s.size, fs::metadata(&p).unwrap().len());
    }

    #[test]
    fn truncate_then_write_keeps_prefix() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("t.txt");
        fs::write(&p, "0123456789").unwrap();
        let mut w = StreamWriter::new(&p, false);
        w.truncate(4).unwrap();
        w.binary(b"ab").unwrap();
        assert_eq!(fs::read(&p).unwrap(), b"0123ab");
        assert_eq!(w.lock_state(), LockState::Unlocked);
    }

    #[test]
    fn flush_before_any_write_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut w = StreamWriter::new(dir.path().join("f.txt"), false);
        w.flush().unwrap();
        w.close().unwrap();
        w.close().unwrap();
    }
}
