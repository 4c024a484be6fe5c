//! CLI settings: `.sift.toml` in the working directory, overridden by flags.
//!
//! ```toml
//! model-dir = "./models"
//! index-dir = ".sift"
//! max-file-kb = 512
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sift_core::config::DEFAULT_MAX_FILE_KB;

/// Default location of the index, relative to the working directory.
pub const DEFAULT_INDEX_DIR: &str = ".sift";

/// Default location of the model files.
pub const DEFAULT_MODEL_DIR: &str = "./models";

const SETTINGS_FILE: &str = ".sift.toml";

/// Values loadable from `.sift.toml`. Missing fields fall back to defaults;
/// a missing or malformed file is treated as empty.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    pub model_dir: Option<PathBuf>,
    pub index_dir: Option<PathBuf>,
    pub max_file_kb: Option<u64>,
}

impl Settings {
    /// Loads `.sift.toml` from the working directory.
    pub fn load() -> Self {
        Self::load_from(Path::new(SETTINGS_FILE))
    }

    fn load_from(path: &Path) -> Self {
        let Ok(raw) = fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("ignoring malformed {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Resolves the model directory: flag, then file, then default.
    pub fn model_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.model_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR))
    }

    /// Resolves the index directory: flag, then file, then default.
    pub fn index_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.index_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_DIR))
    }

    /// Resolves the per-file size cap in KiB: flag, then file, then default.
    pub fn max_file_kb(&self, flag: Option<u64>) -> u64 {
        flag.or(self.max_file_kb).unwrap_or(DEFAULT_MAX_FILE_KB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let settings = Settings::load_from(Path::new("/nonexistent/.sift.toml"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.index_dir(None), PathBuf::from(DEFAULT_INDEX_DIR));
        assert_eq!(settings.max_file_kb(None), DEFAULT_MAX_FILE_KB);
    }

    #[test]
    fn test_file_values_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sift.toml");
        fs::write(&path, "model-dir = \"/opt/models\"\nmax-file-kb = 128\n").unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.model_dir(None), PathBuf::from("/opt/models"));
        assert_eq!(settings.max_file_kb(None), 128);
        // Unset field still defaults.
        assert_eq!(settings.index_dir(None), PathBuf::from(DEFAULT_INDEX_DIR));
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sift.toml");
        fs::write(&path, "max-file-kb = 128\n").unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.max_file_kb(Some(64)), 64);
        assert_eq!(
            settings.model_dir(Some(PathBuf::from("/flag/models"))),
            PathBuf::from("/flag/models")
        );
    }

    #[test]
    fn test_malformed_file_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sift.toml");
        fs::write(&path, "not [ valid toml").unwrap();

        assert_eq!(Settings::load_from(&path), Settings::default());
    }
}
