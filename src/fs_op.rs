pub mod error;
pub mod lock;
pub mod metadata;
pub mod stat;

pub use error::{AccessOp, Result, StreamError};
pub use lock::{LockKind, LockOptions, LockState, LockedFile, OpenMode};
pub use metadata::FileMetadata;
