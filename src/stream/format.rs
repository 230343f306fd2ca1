use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fs_op::error::StreamError;

/// Default size of a `binary` record in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Platform line terminator appended by line-oriented encoders.
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Name of a format, shared by readers and writers for logging and tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatKind {
    Character,
    Line,
    Csv,
    Binary,
    Json,
    Regex,
    FixedWidth,
    Xml,
    Serialized,
    JsonArray,
}

impl FormatKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            FormatKind::Character => "character",
            FormatKind::Line => "line",
            FormatKind::Csv => "csv",
            FormatKind::Binary => "binary",
            FormatKind::Json => "json",
            FormatKind::Regex => "regex",
            FormatKind::FixedWidth => "fixedWidth",
            FormatKind::Xml => "xml",
            FormatKind::Serialized => "serialized",
            FormatKind::JsonArray => "jsonArray",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Separator, enclosure and escape bytes for CSV rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvDialect {
    #[serde(with = "ascii_byte")]
    pub delimiter: u8,
    #[serde(with = "ascii_byte")]
    pub quote: u8,
    /// Escape byte for quotes inside quoted fields. Only consulted when
    /// `double_quote` is off on write; on read it is honoured alongside it.
    #[serde(with = "ascii_byte_opt", skip_serializing_if = "Option::is_none")]
    pub escape: Option<u8>,
    pub double_quote: bool,
}

// Dialect bytes are written as one-character strings in config files.
mod ascii_byte {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &u8, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_char(char::from(*b))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let c = char::deserialize(d)?;
        u8::try_from(c)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| D::Error::custom(format!("{c:?} is not an ASCII character")))
    }
}

mod ascii_byte_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &Option<u8>, s: S) -> Result<S::Ok, S::Error> {
        match b {
            Some(b) => super::ascii_byte::serialize(b, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapped(#[serde(with = "super::ascii_byte")] u8);
        Ok(Option::<Wrapped>::deserialize(d)?.map(|Wrapped(b)| b))
    }
}

impl Default for CsvDialect {
    fn default() -> Self {
        CsvDialect {
            delimiter: b',',
            quote: b'"',
            escape: None,
            double_quote: true,
        }
    }
}

impl CsvDialect {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_escape(mut self, escape: u8) -> Self {
        self.escape = Some(escape);
        self.double_quote = false;
        self
    }
}

/// Decoding strategy for a reader session, with its parameters.
#[derive(Debug, Clone)]
pub enum ReadFormat {
    /// One `char` at a time.
    Character,
    /// One line, terminator included.
    Line,
    /// One row of fields.
    Csv(CsvDialect),
    /// Fixed-size byte chunks; the last one may be shorter.
    Binary { chunk_size: usize },
    /// One JSON value per non-blank line.
    JsonLines,
    /// Capture groups of every line matching the pattern.
    Regex(Regex),
    /// Fields sliced from each line at cumulative `char` offsets.
    FixedWidth(Vec<usize>),
    /// Every element with the given tag name.
    Xml { tag: String },
    /// One natively serialized value per line.
    Serialized,
    /// Items of a single JSON array spanning the file.
    JsonArray,
}

impl ReadFormat {
    pub fn binary() -> Self {
        ReadFormat::Binary {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Reject parameters no decoder can work with.
    pub fn validate(&self) -> Result<(), StreamError> {
        match self {
            ReadFormat::Binary { chunk_size: 0 } => Err(StreamError::Argument(
                "binary chunk size must be positive".into(),
            )),
            ReadFormat::FixedWidth(widths) if widths.is_empty() => Err(StreamError::Argument(
                "fixed-width format needs at least one width".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> FormatKind {
        match self {
            ReadFormat::Character => FormatKind::Character,
            ReadFormat::Line => FormatKind::Line,
            ReadFormat::Csv(_) => FormatKind::Csv,
            ReadFormat::Binary { .. } => FormatKind::Binary,
            ReadFormat::JsonLines => FormatKind::Json,
            ReadFormat::Regex(_) => FormatKind::Regex,
            ReadFormat::FixedWidth(_) => FormatKind::FixedWidth,
            ReadFormat::Xml { .. } => FormatKind::Xml,
            ReadFormat::Serialized => FormatKind::Serialized,
            ReadFormat::JsonArray => FormatKind::JsonArray,
        }
    }
}

impl PartialEq for ReadFormat {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ReadFormat::Csv(a), ReadFormat::Csv(b)) => a == b,
            (ReadFormat::Binary { chunk_size: a }, ReadFormat::Binary { chunk_size: b }) => a == b,
            (ReadFormat::Regex(a), ReadFormat::Regex(b)) => a.as_str() == b.as_str(),
            (ReadFormat::FixedWidth(a), ReadFormat::FixedWidth(b)) => a == b,
            (ReadFormat::Xml { tag: a }, ReadFormat::Xml { tag: b }) => a == b,
            (a, b) => a.kind() == b.kind() && !a.has_params(),
        }
    }
}

impl ReadFormat {
    fn has_params(&self) -> bool {
        matches!(
            self,
            ReadFormat::Csv(_)
                | ReadFormat::Binary { .. }
                | ReadFormat::Regex(_)
                | ReadFormat::FixedWidth(_)
                | ReadFormat::Xml { .. }
        )
    }
}
