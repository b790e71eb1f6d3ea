//! Log file location and rotation.
//!
//! The subscriber itself is installed by the binary.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths;

/// Rotate once the log grows past this many bytes (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated files kept next to the live log.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

const LOG_FILE_NAME: &str = "tspdbg.log";

/// `<data_dir>/tspdbg.log`, or a temp-dir path when no home is known.
pub fn default_log_file_path() -> PathBuf {
    paths::data_dir()
        .unwrap_or_else(|| std::env::temp_dir().join("tspdbg"))
        .join(LOG_FILE_NAME)
}

/// Create the log file's parent directory if needed.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Shift `tspdbg.log` to `tspdbg.log.1` (and older files up by one) once it
/// reaches `max_size`. The file at index `max_files` is dropped.
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for index in (1..max_files).rev() {
        let from = rotated_path(log_path, index);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, index + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{index}"));
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_is_a_tspdbg_log() {
        let path = default_log_file_path();
        assert_eq!(path.file_name().unwrap(), "tspdbg.log");
        assert!(path.to_string_lossy().contains("tspdbg"));
    }

    #[test]
    fn rotated_names() {
        let base = Path::new("/var/log/tspdbg.log");
        assert_eq!(rotated_path(base, 2), PathBuf::from("/var/log/tspdbg.log.2"));
    }

    #[test]
    fn ensure_log_dir_creates_parents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("a").join("b").join("tspdbg.log");
        ensure_log_dir(&log).unwrap();
        assert!(log.parent().unwrap().is_dir());
    }

    #[test]
    fn missing_or_small_log_is_left_alone() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("tspdbg.log");
        rotate_log_files(&log, 10, 3).unwrap();

        fs::write(&log, "short").unwrap();
        rotate_log_files(&log, 10, 3).unwrap();
        assert!(log.exists());
        assert!(!tmp.path().join("tspdbg.log.1").exists());
    }

    #[test]
    fn rotation_cascades_and_drops_oldest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("tspdbg.log");
        fs::write(tmp.path().join("tspdbg.log.1"), "one").unwrap();
        fs::write(tmp.path().join("tspdbg.log.2"), "two").unwrap();
        fs::write(&log, "x".repeat(64)).unwrap();

        rotate_log_files(&log, 32, 2).unwrap();

        assert!(!log.exists());
        assert_eq!(
            fs::read_to_string(tmp.path().join("tspdbg.log.1")).unwrap(),
            "x".repeat(64)
        );
        assert_eq!(fs::read_to_string(tmp.path().join("tspdbg.log.2")).unwrap(), "one");
        assert!(!tmp.path().join("tspdbg.log.3").exists());
    }
}
