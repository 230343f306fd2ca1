use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::fs_op::error::{Result, StreamError};
use crate::stream::decode::{trim_line_ending, LineSource, RecordDecoder};
use crate::stream::record::Record;

/// Yields one natively serialized value per line.
///
/// Each line holds a base64 wrapped postcard payload. Empty lines are
/// skipped and do not count as records.
pub struct SerializedDecoder {
    source: LineSource,
    produced: u64,
}

impl SerializedDecoder {
    pub fn new(source: LineSource) -> Self {
        SerializedDecoder {
            source,
            produced: 0,
        }
    }
}

impl RecordDecoder for SerializedDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        while let Some(line) = self.source.next_line()? {
            let payload = trim_line_ending(&line);
            if payload.is_empty() {
                continue;
            }
            let bytes = STANDARD.decode(payload).map_err(|e| {
                StreamError::decode(
                    self.source.path(),
                    self.produced,
                    format!("line {}: {}", self.source.line_number(), e),
                )
            })?;
            self.produced += 1;
            return Ok(Some(Record::Serialized(bytes)));
        }
        Ok(None)
    }
}
