pub mod decode;
pub mod encode;
pub mod format;
pub mod reader;
pub mod record;
pub mod writer;

pub use format::{CsvDialect, FormatKind, ReadFormat, DEFAULT_CHUNK_SIZE, LINE_ENDING};
pub use reader::{ReaderOptions, ReaderState, StreamReader, Values};
pub use record::{Record, XmlElement};
pub use writer::{StreamWriter, WriterOptions, WriterSummary};
