use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The operation that was being attempted when an OS-level failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    Open,
    Lock,
    Unlock,
    Read,
    Write,
    Seek,
    Truncate,
    Sync,
    Stat,
}

impl fmt::Display for AccessOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessOp::Open => "open",
            AccessOp::Lock => "lock",
            AccessOp::Unlock => "unlock",
            AccessOp::Read => "read",
            AccessOp::Write => "write",
            AccessOp::Seek => "seek",
            AccessOp::Truncate => "truncate",
            AccessOp::Sync => "sync",
            AccessOp::Stat => "stat",
        };
        f.write_str(s)
    }
}

/// Errors produced by locked handles, streaming readers and writers.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The path could not be opened, locked, unlocked, read or written.
    #[error("cannot {op} `{path}`: {source}")]
    Access {
        path: PathBuf,
        op: AccessOp,
        #[source]
        source: io::Error,
    },

    /// Input is malformed for the selected format.
    #[error("malformed record #{record} in `{path}`: {message}")]
    Decode {
        path: PathBuf,
        record: u64,
        message: String,
    },

    /// A value cannot be represented in the target format.
    #[error("cannot encode {format} record: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },

    /// Caller-supplied parameters are structurally invalid.
    #[error("invalid argument: {0}")]
    Argument(String),
}

impl StreamError {
    pub fn access(path: &Path, op: AccessOp, source: io::Error) -> Self {
        StreamError::Access {
            path: path.to_path_buf(),
            op,
            source,
        }
    }

    pub fn decode(path: &Path, record: u64, message: impl fmt::Display) -> Self {
        StreamError::Decode {
            path: path.to_path_buf(),
            record,
            message: message.to_string(),
        }
    }

    pub fn encode(format: &'static str, message: impl fmt::Display) -> Self {
        StreamError::Encode {
            format,
            message: message.to_string(),
        }
    }

    /// `true` when this is an access failure caused by a contended lock.
    pub fn is_lock_contended(&self) -> bool {
        matches!(
            self,
            StreamError::Access { op: AccessOp::Lock, source, .. }
                if source.kind() == io::ErrorKind::WouldBlock
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

/// Attach path and operation context to raw `io::Result`s.
pub trait AccessContext<T> {
    fn access(self, path: &Path, op: AccessOp) -> Result<T>;
}

impl<T> AccessContext<T> for io::Result<T> {
    fn access(self, path: &Path, op: AccessOp) -> Result<T> {
        self.map_err(|e| StreamError::access(path, op, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_message_names_path_and_op() {
        let err = StreamError::access(
            Path::new("/tmp/x.txt"),
            AccessOp::Lock,
            io::Error::from(io::ErrorKind::WouldBlock),
        );
        let msg = err.to_string();
        assert!(msg.contains("cannot lock"), "{msg}");
        assert!(msg.contains("/tmp/x.txt"), "{msg}");
        assert!(err.is_lock_contended());
    }

    #[test]
    fn context_maps_io_errors() {
        let r: io::Result<()> = Err(io::Error::from(io::ErrorKind::NotFound));
        let err = r.access(Path::new("a"), AccessOp::Open).unwrap_err();
        assert!(matches!(err, StreamError::Access { op: AccessOp::Open, .. }));
        assert!(!err.is_lock_contended());
    }
}
