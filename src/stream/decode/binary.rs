use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::fs_op::error::{AccessContext, AccessOp, Result, StreamError};
use crate::stream::decode::RecordDecoder;
use crate::stream::record::Record;

/// Yields fixed-size byte chunks; only the last may be shorter.
pub struct BinaryDecoder {
    file: File,
    path: PathBuf,
    chunk_size: usize,
}

impl BinaryDecoder {
    pub fn new(file: File, path: PathBuf, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StreamError::Argument("binary chunk size must be positive".into()));
        }
        Ok(BinaryDecoder {
            file,
            path,
            chunk_size,
        })
    }
}

impl RecordDecoder for BinaryDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        (&mut self.file)
            .take(self.chunk_size as u64)
            .read_to_end(&mut chunk)
            .access(&self.path, AccessOp::Read)?;
        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Record::Bytes(chunk)))
        }
    }
}
