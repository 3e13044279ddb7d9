//! User settings: UI theme and avatar display names
//!
//! Kept as JSON (`settings.json`) in the shape other tools already read:
//! `{"isLightMode": bool, "avatarIdAssociations": {avatarId: displayName}}`.

use crate::config::write_atomic;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub is_light_mode: bool,
    /// avatarId → user-chosen display name
    pub avatar_id_associations: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings, falling back to defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Settings: {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())?;
        log::debug!("Settings: Saved to {:?}", path);
        Ok(())
    }

    pub fn associate_name_to_avatar(&mut self, name: impl Into<String>, avatar_id: impl Into<String>) {
        self.avatar_id_associations
            .insert(avatar_id.into(), name.into());
    }

    /// Display name for an avatar, or an empty string if none was set
    pub fn name_for_avatar(&self, avatar_id: &str) -> &str {
        self.avatar_id_associations
            .get(avatar_id)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Display name if one was set, otherwise the avatar id itself
    pub fn display_name<'a>(&'a self, avatar_id: &'a str) -> &'a str {
        match self.name_for_avatar(avatar_id) {
            "" => avatar_id,
            name => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_file_shape_and_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.is_light_mode = true;
        settings.associate_name_to_avatar("Fox", "avtr_1");
        settings.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["isLightMode"], true);
        assert_eq!(raw["avatarIdAssociations"]["avtr_1"], "Fox");

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_display_names() {
        let mut settings = Settings::default();
        settings.associate_name_to_avatar("Fox", "avtr_1");
        assert_eq!(settings.name_for_avatar("avtr_1"), "Fox");
        assert_eq!(settings.name_for_avatar("avtr_2"), "");
        assert_eq!(settings.display_name("avtr_2"), "avtr_2");

        settings.associate_name_to_avatar("Wolf", "avtr_1");
        assert_eq!(settings.display_name("avtr_1"), "Wolf");
    }
}
