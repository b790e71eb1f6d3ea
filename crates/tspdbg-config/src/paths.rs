//! Per-user directories.

use std::path::PathBuf;

const APP_DIR: &str = "tspdbg";

/// The user's home directory, falling back to `$HOME`.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().or_else(|| std::env::var_os("HOME").map(PathBuf::from))
}

/// `~/.config/tspdbg`
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config").join(APP_DIR))
}

/// `~/.local/share/tspdbg` on Linux, the platform data directory elsewhere.
pub fn data_dir() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        home_dir().map(|home| home.join(".local").join("share").join(APP_DIR))
    } else {
        dirs::data_local_dir().map(|dir| dir.join(APP_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_are_namespaced() {
        if let Some(dir) = config_dir() {
            assert!(dir.ends_with(".config/tspdbg"));
        }
        if let Some(dir) = data_dir() {
            assert_eq!(dir.file_name().unwrap(), "tspdbg");
        }
    }
}
