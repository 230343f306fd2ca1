//! Locked, format-aware streaming over plain files.
//!
//! [`StreamReader`] walks a file one record at a time under a shared advisory
//! lock, decoding lines, CSV rows, JSON values, XML elements, fixed-size byte
//! chunks and more. [`StreamWriter`] appends records in the same formats,
//! taking an exclusive lock around each call.
//!
//! ```no_run
//! use filekit::{StreamReader, StreamWriter};
//!
//! # fn main() -> filekit::Result<()> {
//! let mut w = StreamWriter::new("people.csv", false);
//! w.csv(["Name", "Age"])?;
//! w.csv_serialize(&("John", 30))?;
//!
//! let mut r = StreamReader::new("people.csv");
//! r.csv(Default::default())?;
//! for row in r {
//!     println!("{:?}", row?.as_fields());
//! }
//! # Ok(())
//! # }
//! ```

pub mod fs_op;
pub mod logging;
pub mod settings;
pub mod stream;

pub use crate::fs_op::{AccessOp, LockKind, LockOptions, LockState, Result, StreamError};
pub use crate::settings::Settings;
pub use crate::stream::{
    CsvDialect, FormatKind, ReadFormat, ReaderOptions, Record, StreamReader, StreamWriter,
    WriterOptions, WriterSummary, XmlElement,
};
