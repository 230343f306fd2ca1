//! Per-format decoding strategies.
//!
//! Each strategy is a small struct holding its own buffered view of the file
//! and whatever parser state it needs between records. Strategies only move
//! forward; a reader restarts one by seeking the handle and building a fresh
//! strategy through [`open_decoder`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::fs_op::error::{AccessContext, AccessOp, Result};
use crate::stream::format::ReadFormat;
use crate::stream::record::Record;

mod binary;
mod csv;
mod json;
mod serialized;
mod text;
mod xml;

pub use self::binary::BinaryDecoder;
pub use self::csv::CsvDecoder;
pub use self::json::{JsonArrayDecoder, JsonLinesDecoder};
pub use self::serialized::SerializedDecoder;
pub use self::text::{CharacterDecoder, FixedWidthDecoder, LineDecoder, RegexDecoder};
pub use self::xml::XmlDecoder;

/// A lazy, forward-only sequence of records.
pub trait RecordDecoder: Send {
    /// Produce the next record, or `None` once input is exhausted.
    fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Build the strategy for `format`, reading `file` from its current offset.
///
/// `size_hint` is the file size observed when the session opened.
pub fn open_decoder(
    format: &ReadFormat,
    file: File,
    path: &Path,
    size_hint: u64,
) -> Result<Box<dyn RecordDecoder>> {
    let path = path.to_path_buf();
    let decoder: Box<dyn RecordDecoder> = match format {
        ReadFormat::Character => Box::new(CharacterDecoder::new(LineSource::new(file, path))),
        ReadFormat::Line => Box::new(LineDecoder::new(LineSource::new(file, path))),
        ReadFormat::Csv(dialect) => Box::new(CsvDecoder::new(file, path, dialect)),
        ReadFormat::Binary { chunk_size } => Box::new(BinaryDecoder::new(file, path, *chunk_size)?),
        ReadFormat::JsonLines => Box::new(JsonLinesDecoder::new(LineSource::new(file, path))),
        ReadFormat::Regex(re) => Box::new(RegexDecoder::new(LineSource::new(file, path), re.clone())),
        ReadFormat::FixedWidth(widths) => {
            Box::new(FixedWidthDecoder::new(LineSource::new(file, path), widths.clone()))
        }
        ReadFormat::Xml { tag } => Box::new(XmlDecoder::new(file, path, tag.clone())),
        ReadFormat::Serialized => Box::new(SerializedDecoder::new(LineSource::new(file, path))),
        ReadFormat::JsonArray => Box::new(JsonArrayDecoder::load(file, path, size_hint)?),
    };
    Ok(decoder)
}

/// Buffered line access shared by the line-oriented strategies.
pub struct LineSource {
    inner: BufReader<File>,
    path: PathBuf,
    buf: Vec<u8>,
    lines_read: u64,
}

impl LineSource {
    pub fn new(file: File, path: PathBuf) -> Self {
        LineSource {
            inner: BufReader::new(file),
            path,
            buf: Vec::new(),
            lines_read: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 1-based number of the line most recently returned.
    pub fn line_number(&self) -> u64 {
        self.lines_read
    }

    /// Next raw line with its terminator, decoded lossily as UTF-8.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let n = self
            .inner
            .read_until(b'\n', &mut self.buf)
            .access(&self.path, AccessOp::Read)?;
        if n == 0 {
            return Ok(None);
        }
        self.lines_read += 1;
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    /// Look at the next byte without consuming it.
    pub fn peek_byte(&mut self) -> Result<Option<u8>> {
        let buf = self.inner.fill_buf().access(&self.path, AccessOp::Read)?;
        Ok(buf.first().copied())
    }

    pub fn next_byte(&mut self) -> Result<Option<u8>> {
        let b = self.peek_byte()?;
        if b.is_some() {
            self.inner.consume(1);
        }
        Ok(b)
    }
}

/// Strip a trailing `\n` or `\r\n`.
pub fn trim_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_both_terminators() {
        assert_eq!(trim_line_ending("a\n"), "a");
        assert_eq!(trim_line_ending("a\r\n"), "a");
        assert_eq!(trim_line_ending("a"), "a");
        assert_eq!(trim_line_ending("\n"), "");
    }
}
