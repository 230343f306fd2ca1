use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use serde_json::Value;

use crate::fs_op::error::{AccessContext, AccessOp, Result, StreamError};
use crate::stream::decode::{LineSource, RecordDecoder};
use crate::stream::record::Record;

/// Yields one JSON value per non-blank line. Blank lines are skipped.
pub struct JsonLinesDecoder {
    source: LineSource,
    produced: u64,
}

impl JsonLinesDecoder {
    pub fn new(source: LineSource) -> Self {
        JsonLinesDecoder {
            source,
            produced: 0,
        }
    }
}

impl RecordDecoder for JsonLinesDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        while let Some(line) = self.source.next_line()? {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line).map_err(|e| {
                StreamError::decode(
                    self.source.path(),
                    self.produced,
                    format!("line {}: {}", self.source.line_number(), e),
                )
            })?;
            self.produced += 1;
            return Ok(Some(Record::Json(value)));
        }
        Ok(None)
    }
}

/// Yields the items of a single JSON array that spans the whole file.
///
/// The document is read and parsed when the decoder is built.
pub struct JsonArrayDecoder {
    items: std::vec::IntoIter<Value>,
}

impl JsonArrayDecoder {
    pub fn load(mut file: File, path: PathBuf, size_hint: u64) -> Result<Self> {
        let capacity = usize::try_from(size_hint).unwrap_or(0);
        let mut content = Vec::with_capacity(capacity);
        file.read_to_end(&mut content)
            .access(&path, AccessOp::Read)?;
        let value: Value =
            serde_json::from_slice(&content).map_err(|e| StreamError::decode(&path, 0, e))?;
        match value {
            Value::Array(items) => {
                tracing::debug!(path = %path.display(), items = items.len(), "loaded json array");
                Ok(JsonArrayDecoder {
                    items: items.into_iter(),
                })
            }
            other => Err(StreamError::decode(
                &path,
                0,
                format!("expected a JSON array, found {}", json_type(&other)),
            )),
        }
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl RecordDecoder for JsonArrayDecoder {
    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self.items.next().map(Record::Json))
    }
}
