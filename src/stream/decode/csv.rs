use std::fs::File;
use std::path::{Path, PathBuf};

use crate::fs_op::error::{AccessOp, Result, StreamError};
use crate::stream::decode::RecordDecoder;
use crate::stream::format::CsvDialect;
use crate::stream::record::Record;

/// Yields one row of fields per CSV record.
///
/// The parser runs in flexible mode and fields are decoded lossily, so a
/// ragged or oddly encoded row comes through as the parser saw it.
pub struct CsvDecoder {
    reader: ::csv::Reader<File>,
    row: ::csv::ByteRecord,
    path: PathBuf,
}

impl CsvDecoder {
    pub fn new(file: File, path: PathBuf, dialect: &CsvDialect) -> Self {
        let reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(dialect.delimiter)
            .quote(dialect.quote)
            .escape(dialect.escape)
            .double_quote(dialect.double_quote)
            .from_reader(file);
        CsvDecoder {
            reader,
            row: ::csv::ByteRecord::new(),
            path,
        }
    }
}

impl RecordDecoder for CsvDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let more = self
            .reader
            .read_byte_record(&mut self.row)
            .map_err(|e| csv_error(&self.path, e))?;
        if !more {
            return Ok(None);
        }
        let fields = self
            .row
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();
        Ok(Some(Record::Fields(fields)))
    }
}

/// I/O failures stay access errors; anything the parser rejects is a decode
/// error at the record it was reading.
fn csv_error(path: &Path, e: ::csv::Error) -> StreamError {
    let (line, record) = e
        .position()
        .map(|p| (p.line(), p.record()))
        .unwrap_or((0, 0));
    match e.into_kind() {
        ::csv::ErrorKind::Io(io_err) => StreamError::access(path, AccessOp::Read, io_err),
        other => StreamError::decode(path, record, format!("line {line}: {other:?}")),
    }
}
