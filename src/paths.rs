//! Filesystem helpers shared by the host and the receiver.

use std::io;
use std::path::Path;

/// Remove `dir` if it exists and recreate it empty.
pub fn reset_dir(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(dir)
}

/// Return `name` if it is safe to use as a single file name inside a
/// directory: no separators, no parent references, not empty.
///
/// # Examples
///
/// ```
/// use segcast::paths::safe_file_name;
///
/// assert_eq!(safe_file_name("chunk_000.mp4"), Some("chunk_000.mp4"));
/// assert_eq!(safe_file_name("../etc/passwd"), None);
/// assert_eq!(safe_file_name("a/b.mp4"), None);
/// ```
pub fn safe_file_name(name: &str) -> Option<&str> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_dir_clears_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("stale.mp4"), b"old").unwrap();

        reset_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_reset_dir_creates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("b");
        reset_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_safe_file_name_rejects_traversal() {
        assert!(safe_file_name("").is_none());
        assert!(safe_file_name("..").is_none());
        assert!(safe_file_name("..\\x").is_none());
        assert!(safe_file_name("/abs.mp4").is_none());
        assert_eq!(safe_file_name("..chunk.mp4"), Some("..chunk.mp4"));
    }
}
