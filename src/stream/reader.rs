//! Lazy, lock-holding record cursor over one file.
//!
//! A [`StreamReader`] starts with no OS handle. The first format selection
//! opens the path, records its size, takes a shared (or exclusive) lock for
//! the whole session and primes the first record. From then on the cursor
//! follows the usual external-iteration contract: [`valid`](StreamReader::valid),
//! [`current`](StreamReader::current), [`advance`](StreamReader::advance),
//! [`key`](StreamReader::key), [`rewind`](StreamReader::rewind), plus
//! [`seek`](StreamReader::seek) and [`count`](StreamReader::count). It is also
//! an `Iterator` over `Result<Record>`.

use std::io::{Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::fs_op::error::{AccessContext, AccessOp, Result, StreamError};
use crate::fs_op::lock::{LockKind, LockOptions, LockState, LockedFile, OpenMode};
use crate::fs_op::metadata;
use crate::settings::Settings;
use crate::stream::decode::{open_decoder, RecordDecoder};
use crate::stream::format::{CsvDialect, ReadFormat};
use crate::stream::record::Record;

/// Construction options for a [`StreamReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Hold an exclusive lock for the session instead of a shared one.
    pub exclusive_lock: bool,
    pub lock: LockOptions,
}

impl ReaderOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        ReaderOptions {
            exclusive_lock: false,
            lock: settings.lock.options(),
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive_lock = true;
        self
    }
}

/// Lifecycle of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No handle yet; nothing selected.
    Uninitialized,
    /// Handle open, lock held, format fixed for the session.
    Open,
    /// Closed explicitly; a new reader is needed to read again.
    Closed,
}

pub struct StreamReader {
    handle: LockedFile,
    options: ReaderOptions,
    state: ReaderState,
    format: Option<ReadFormat>,
    decoder: Option<Box<dyn RecordDecoder>>,
    current: Option<Record>,
    position: u64,
    file_size: u64,
    pending: Option<StreamError>,
}

impl StreamReader {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_options(path, ReaderOptions::default())
    }

    pub fn with_options<P: Into<PathBuf>>(path: P, options: ReaderOptions) -> Self {
        StreamReader {
            handle: LockedFile::new(path, OpenMode::Read),
            options,
            state: ReaderState::Uninitialized,
            format: None,
            decoder: None,
            current: None,
            position: 0,
            file_size: 0,
            pending: None,
        }
    }

    pub fn path(&self) -> &Path {
        self.handle.path()
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn format(&self) -> Option<&ReadFormat> {
        self.format.as_ref()
    }

    pub fn lock_state(&self) -> LockState {
        self.handle.state()
    }

    /// File size observed when the session opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Fix the decoding strategy for this session and prime the first record.
    ///
    /// Selecting the same format again is a no-op; selecting a different one
    /// once the session is open is an argument error.
    pub fn select(&mut self, format: ReadFormat) -> Result<&mut Self> {
        if self.state == ReaderState::Closed {
            return Err(self.closed());
        }
        if let Some(active) = self.format.as_ref() {
            if *active == format {
                return Ok(self);
            }
            return Err(StreamError::Argument(format!(
                "reader for `{}` already decodes {}; cannot switch to {}",
                self.path().display(),
                active.kind(),
                format.kind()
            )));
        }

        format.validate()?;
        self.open_session()?;
        tracing::debug!(path = %self.path().display(), format = %format.kind(), "format selected");
        self.format = Some(format);
        self.state = ReaderState::Open;
        self.position = 0;
        if let Err(e) = self.start_decoder(0) {
            // Priming failed: back to a fresh reader so a retry starts over.
            self.format = None;
            self.state = ReaderState::Uninitialized;
            self.decoder = None;
            self.current = None;
            if let Err(close_err) = self.handle.close() {
                tracing::warn!("releasing {} failed: {}", self.path().display(), close_err);
            }
            return Err(e);
        }
        Ok(self)
    }

    pub fn character(&mut self) -> Result<&mut Self> {
        self.select(ReadFormat::Character)
    }

    pub fn line(&mut self) -> Result<&mut Self> {
        self.select(ReadFormat::Line)
    }

    pub fn csv(&mut self, dialect: CsvDialect) -> Result<&mut Self> {
        self.select(ReadFormat::Csv(dialect))
    }

    pub fn binary(&mut self, chunk_size: usize) -> Result<&mut Self> {
        self.select(ReadFormat::Binary { chunk_size })
    }

    pub fn json(&mut self) -> Result<&mut Self> {
        self.select(ReadFormat::JsonLines)
    }

    pub fn regex(&mut self, pattern: Regex) -> Result<&mut Self> {
        self.select(ReadFormat::Regex(pattern))
    }

    pub fn fixed_width(&mut self, widths: Vec<usize>) -> Result<&mut Self> {
        self.select(ReadFormat::FixedWidth(widths))
    }

    pub fn xml(&mut self, tag: impl Into<String>) -> Result<&mut Self> {
        self.select(ReadFormat::Xml { tag: tag.into() })
    }

    pub fn serialized(&mut self) -> Result<&mut Self> {
        self.select(ReadFormat::Serialized)
    }

    pub fn json_array(&mut self) -> Result<&mut Self> {
        self.select(ReadFormat::JsonArray)
    }

    /// `true` while a record is ready in [`current`](Self::current).
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&Record> {
        self.current.as_ref()
    }

    /// Decode the current `Serialized` record into `T`.
    pub fn current_value<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.current
            .as_ref()
            .map(|record| record.decode_serialized(self.path(), self.position))
            .transpose()
    }

    /// Iterate the remaining `Serialized` records as typed values.
    ///
    /// A payload that does not decode as `T` is a decode error for that
    /// record; iteration may continue past it.
    pub fn values<T: DeserializeOwned>(&mut self) -> Values<'_, T> {
        Values {
            reader: self,
            marker: PhantomData,
        }
    }

    /// Zero-based index of the current record.
    pub fn key(&self) -> u64 {
        self.position
    }

    /// Records consumed so far in this session.
    pub fn count(&self) -> u64 {
        self.position
    }

    /// Move to the next record. No-op once the input is exhausted.
    pub fn advance(&mut self) -> Result<()> {
        if self.state == ReaderState::Closed {
            return Err(self.closed());
        }
        if self.current.is_none() {
            return Ok(());
        }
        self.position += 1;
        self.fetch()
    }

    /// Restart the active decoder from byte 0.
    pub fn rewind(&mut self) -> Result<()> {
        match self.state {
            ReaderState::Closed => Err(self.closed()),
            ReaderState::Uninitialized => Ok(()),
            ReaderState::Open => {
                self.pending = None;
                self.position = 0;
                self.start_decoder(0)
            }
        }
    }

    /// Position the cursor on record `n`.
    ///
    /// Binary sessions jump straight to the byte offset; every other format
    /// rewinds and replays. Past the end, the cursor is left invalid with
    /// `key()` equal to the number of records that exist.
    pub fn seek(&mut self, n: i64) -> Result<()> {
        if n < 0 {
            return Err(StreamError::Argument(format!(
                "seek position must be non-negative, got {n}"
            )));
        }
        let target = n as u64;
        match self.state {
            ReaderState::Closed => return Err(self.closed()),
            ReaderState::Uninitialized => {
                return Err(StreamError::Argument(
                    "select a format before seeking".into(),
                ))
            }
            ReaderState::Open => {}
        }

        if let Some(&ReadFormat::Binary { chunk_size }) = self.format.as_ref() {
            if chunk_size == 0 {
                return Err(StreamError::Argument(
                    "binary chunk size must be positive".into(),
                ));
            }
            let chunk = chunk_size as u64;
            let size = metadata::file_size(self.path())?;
            let target = target.min(size.div_ceil(chunk));
            self.pending = None;
            self.position = target;
            return self.start_decoder(target * chunk);
        }

        self.rewind()?;
        while self.position < target && self.valid() {
            self.advance()?;
        }
        Ok(())
    }

    /// Give up the session lock while keeping the handle.
    pub fn release_lock(&mut self) -> Result<()> {
        self.handle.release()
    }

    /// Release the lock and the handle. Further reads are rejected.
    pub fn close(&mut self) -> Result<()> {
        self.decoder = None;
        self.current = None;
        self.pending = None;
        self.state = ReaderState::Closed;
        self.handle.close()
    }

    fn closed(&self) -> StreamError {
        StreamError::Argument(format!("reader for `{}` is closed", self.path().display()))
    }

    fn open_session(&mut self) -> Result<()> {
        self.handle.open()?;
        self.file_size = metadata::file_size(self.handle.path())?;
        let kind = if self.options.exclusive_lock {
            LockKind::Exclusive
        } else {
            LockKind::Shared
        };
        self.handle.acquire(kind, self.options.lock)
    }

    /// Rebuild the decoder at byte `offset` and prime its first record.
    fn start_decoder(&mut self, offset: u64) -> Result<()> {
        self.decoder = None;
        self.current = None;
        let format = match self.format.as_ref() {
            Some(f) => f,
            None => return Err(StreamError::Argument("no format selected".into())),
        };
        let path = self.handle.path().to_path_buf();
        self.handle
            .file_mut()?
            .seek(SeekFrom::Start(offset))
            .access(&path, AccessOp::Seek)?;
        let file = self.handle.try_clone()?;
        self.decoder = Some(open_decoder(format, file, &path, self.file_size)?);
        self.fetch()
    }

    fn fetch(&mut self) -> Result<()> {
        let Some(decoder) = self.decoder.as_mut() else {
            self.current = None;
            return Ok(());
        };
        match decoder.next_record() {
            Ok(record) => {
                if record.is_some() {
                    tracing::trace!(position = self.position, "record ready");
                }
                self.current = record;
                Ok(())
            }
            Err(e) => {
                // A failed decoder is finished; only a rewind restarts it.
                self.current = None;
                self.decoder = None;
                Err(e)
            }
        }
    }
}

impl Iterator for StreamReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }
        let record = self.current.take()?;
        self.position += 1;
        if let Err(e) = self.fetch() {
            self.pending = Some(e);
        }
        Some(Ok(record))
    }
}

/// Typed view over a serialized session; see [`StreamReader::values`].
pub struct Values<'a, T> {
    reader: &'a mut StreamReader,
    marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for Values<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.reader.position;
        let record = match self.reader.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        Some(record.decode_serialized(self.reader.path(), index))
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("path", &self.path())
            .field("state", &self.state)
            .field("format", &self.format.as_ref().map(|f| f.kind()))
            .field("position", &self.position)
            .field("lock", &self.handle.state())
            .finish()
    }
}
