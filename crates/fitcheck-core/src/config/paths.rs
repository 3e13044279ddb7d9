//! Path utilities for FitCheck data files
//!
//! Everything lives under one data root:
//!
//! ```text
//! <data root>/
//! ├── config.yaml
//! ├── settings.json
//! └── presets/
//!     └── <avatarId>/
//!         └── <presetName>.json
//! ```

use std::path::{Path, PathBuf};

/// Environment variable that overrides the data root
pub const DATA_ROOT_ENV: &str = "FITCHECK_DATA";

/// Get the default data root
///
/// Returns `$FITCHECK_DATA` when set, otherwise `<platform data dir>/FitCheck`.
pub fn default_data_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_ROOT_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("FitCheck")
}

/// Directory holding one subdirectory of preset files per avatar
pub fn presets_dir(data_root: &Path) -> PathBuf {
    data_root.join("presets")
}

pub fn config_path(data_root: &Path) -> PathBuf {
    data_root.join("config.yaml")
}

pub fn settings_path(data_root: &Path) -> PathBuf {
    data_root.join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_data_root() {
        let root = Path::new("/data/FitCheck");
        assert_eq!(presets_dir(root), PathBuf::from("/data/FitCheck/presets"));
        assert!(config_path(root).ends_with("config.yaml"));
        assert!(settings_path(root).ends_with("settings.json"));
    }
}
