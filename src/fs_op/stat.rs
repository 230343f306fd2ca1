use std::io;
use std::path::Path;

/// Lightweight classification of a filesystem path's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    /// The path does not exist.
    NotFound,
    /// The path exists and is a directory.
    Directory,
    /// The path exists and is a regular file.
    File,
    /// Socket, FIFO, device node or similar.
    Other,
}

impl PathType {
    /// Classify `path`, following symlinks.
    pub fn of<P: AsRef<Path>>(path: P) -> Self {
        match std::fs::metadata(path.as_ref()) {
            Err(_) => PathType::NotFound,
            Ok(m) if m.is_dir() => PathType::Directory,
            Ok(m) if m.is_file() => PathType::File,
            Ok(_) => PathType::Other,
        }
    }
}

/// Reject paths a stream cursor can never operate on.
pub(crate) fn ensure_streamable(path: &Path) -> io::Result<()> {
    match PathType::of(path) {
        PathType::Directory => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path is a directory",
        )),
        _ => Ok(()),
    }
}

/// Directory that would hold `path` when it is created.
pub(crate) fn containing_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn path_type_nonexistent() {
        let tmp = tempdir().unwrap();
        let p = tmp.path().join("no_such_file_hopefully");
        assert_eq!(PathType::of(&p), PathType::NotFound);
        assert!(ensure_streamable(&p).is_ok());
    }

    #[test]
    fn path_type_file_and_dir() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();
        assert_eq!(PathType::of(&file), PathType::File);
        assert!(ensure_streamable(&file).is_ok());

        let dir = tmp.path().join("subdir");
        fs::create_dir(&dir).unwrap();
        assert_eq!(PathType::of(&dir), PathType::Directory);
        assert!(ensure_streamable(&dir).is_err());
    }

    #[test]
    fn bare_file_name_lives_in_cwd() {
        assert_eq!(containing_dir(Path::new("x.csv")), Path::new("."));
        assert_eq!(containing_dir(Path::new("/a/b/x.csv")), Path::new("/a/b"));
    }
}
