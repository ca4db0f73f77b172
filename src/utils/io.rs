//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

fn io_error(e: std::io::Error, operation: &str, path: &Path) -> Error {
    Error::internal_io(
        e.to_string(),
        Some(format!("{} {}", operation, path.display())),
    )
}

/// Read file contents with standardized error handling.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| io_error(e, operation, path))
}

/// Write content to file with standardized error handling.
pub fn write_file(path: &Path, content: &str, operation: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| io_error(e, operation, path))
}

/// Path of the scratch file used by [`write_file_atomic`].
pub fn scratch_path(path: &Path) -> Option<std::path::PathBuf> {
    let parent = path.parent()?;
    let filename = path.file_name()?;
    Some(parent.join(format!("{}.tmp", filename.to_string_lossy())))
}

/// Write content to file atomically (write to .tmp, then rename).
///
/// Readers always see either the old content or the new content. The
/// scratch file is removed if the rename fails.
pub fn write_file_atomic(path: &Path, content: &str, operation: &str) -> Result<()> {
    let tmp_path = scratch_path(path).ok_or_else(|| {
        Error::internal_io(
            format!("Invalid path: {}", path.display()),
            Some(operation.to_string()),
        )
    })?;

    fs::write(&tmp_path, content)
        .map_err(|e| io_error(e, &format!("{} (write temp)", operation), &tmp_path))?;

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_error(e, &format!("{} (rename)", operation), path));
    }

    Ok(())
}

/// Create a directory and its parents if absent.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| io_error(e, "create directory", dir))
}

/// Copy a file, returning bytes written.
pub fn copy_file(from: &Path, to: &Path) -> Result<u64> {
    fs::copy(from, to).map_err(|e| io_error(e, "copy to", to))
}

/// Append a single line to a file, creating it if needed.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_error(e, "open log", path))?;
    writeln!(file, "{}", line).map_err(|e| io_error(e, "append log", path))
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| io_error(e, "open", path))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| io_error(e, "read", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_file_returns_error_for_missing_file() {
        let result = read_file(Path::new("/nonexistent/path.txt"), "test read");
        let err = result.unwrap_err();
        assert_eq!(err.code.as_str(), "internal.io_error");
    }

    #[test]
    fn atomic_write_leaves_no_scratch_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("compose.yml");
        write_file_atomic(&path, "services: {}\n", "test write").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "services: {}\n");
        assert!(!scratch_path(&path).unwrap().exists());
    }

    #[test]
    fn append_line_accumulates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("activity.log");
        append_line(&path, "one").unwrap();
        append_line(&path, "two").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn sha256_matches_known_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
