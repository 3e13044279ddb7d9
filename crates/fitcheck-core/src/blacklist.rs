//! Replay exclusion rules
//!
//! Parameters driven by the application itself (locomotion, tracking, voice,
//! gestures) must never be replayed from a preset. Rules are consulted only
//! at apply time.

use crate::types::ParameterRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Leaf names owned by the application runtime
const DEFAULT_INDIVIDUAL: &[&str] = &[
    "TrackingTypeProxy",
    "CgeSmiling",
    "VRModeProxy",
    "VelocityX",
    "VelocityY",
    "VelocityZ",
    "AngularY",
    "Grounded",
    "AFK",
    "Upright",
    "TrackingType",
    "VRMode",
    "MuteSelf",
    "Voice",
    "Earmuffs",
    "VelocityMagnitude",
    "ScaleFactor",
    "ScaleFactorInverse",
    "ScaleModified",
    "EyeHeightAsPercent",
    "EyeHeightAsMeters",
    "IsOnFriendsList",
    "IsAnimatorEnabled",
    "Viseme",
    "GestureLeft",
    "GestureRight",
    "GestureLeftWeight",
    "GestureRightWeight",
    "Seated",
    "InStation",
    "PreviewMode",
    "VRCEmote",
    "VRCFaceBlendH",
    "VRCFaceBlendV",
];

/// Raw-name prefixes of tool-generated parameter families
const DEFAULT_PARTIAL: &[&str] = &["OGB", "VF10", "Go", "VFH", "VF_", "FT/v2"];

/// Exact-name and prefix exclusion rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistRules {
    /// Exact leaf names
    pub individual: HashSet<String>,
    /// Case-sensitive prefixes matched against the raw name
    pub partial: Vec<String>,
}

impl Default for BlacklistRules {
    fn default() -> Self {
        Self {
            individual: DEFAULT_INDIVIDUAL.iter().map(|s| s.to_string()).collect(),
            partial: DEFAULT_PARTIAL.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BlacklistRules {
    /// Rules that exclude nothing
    pub fn empty() -> Self {
        Self {
            individual: HashSet::new(),
            partial: Vec::new(),
        }
    }

    /// Check whether a leaf name is in the exact-name set
    pub fn is_individually_blacklisted(&self, name: &str) -> bool {
        self.individual.contains(name)
    }

    /// Check whether a raw name starts with any partial prefix
    pub fn is_partially_blacklisted(&self, raw_name: &str) -> bool {
        self.partial.iter().any(|prefix| raw_name.starts_with(prefix.as_str()))
    }

    /// Check whether a parameter must be skipped during replay
    pub fn is_blacklisted(&self, record: &ParameterRecord) -> bool {
        self.is_individually_blacklisted(record.name())
            || self.is_partially_blacklisted(record.raw_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParameterValue;

    fn record(path: &str) -> ParameterRecord {
        let name = path.rsplit('/').next().unwrap_or(path);
        ParameterRecord::new(name, path, ParameterValue::Bool(true))
    }

    #[test]
    fn test_individual_names_excluded() {
        let rules = BlacklistRules::default();
        assert!(rules.is_blacklisted(&record("/avatar/parameters/VelocityX")));
        assert!(rules.is_blacklisted(&record("/avatar/parameters/GestureLeft")));
        assert!(!rules.is_blacklisted(&record("/avatar/parameters/Smile")));
    }

    #[test]
    fn test_individual_matches_leaf_not_raw_name() {
        let rules = BlacklistRules::default();
        // Nested leaf whose last segment is blacklisted
        assert!(rules.is_blacklisted(&record("/avatar/parameters/Custom/Voice")));
    }

    #[test]
    fn test_partial_prefix_excluded() {
        let rules = BlacklistRules::default();
        assert!(rules.is_blacklisted(&record("/avatar/parameters/OGB/Orf/Touch")));
        assert!(rules.is_blacklisted(&record("/avatar/parameters/FT/v2/EyeLeftX")));
        assert!(rules.is_blacklisted(&record("/avatar/parameters/VF_12_Hue")));
        // Prefix, not substring
        assert!(!rules.is_blacklisted(&record("/avatar/parameters/HairOGB")));
    }

    #[test]
    fn test_partial_is_case_sensitive() {
        let rules = BlacklistRules::default();
        assert!(!rules.is_blacklisted(&record("/avatar/parameters/ogb_lower")));
        assert!(!rules.is_blacklisted(&record("/avatar/parameters/go")));
        assert!(rules.is_blacklisted(&record("/avatar/parameters/GoLoco")));
    }

    #[test]
    fn test_empty_rules_pass_everything() {
        let rules = BlacklistRules::empty();
        assert!(!rules.is_blacklisted(&record("/avatar/parameters/VelocityX")));
        assert!(!rules.is_blacklisted(&record("/avatar/parameters/OGB/Touch")));
    }

    #[test]
    fn test_yaml_override() {
        let rules: BlacklistRules = serde_yaml::from_str("individual: [Hat]\npartial: [Tail/]\n").unwrap();
        assert!(rules.is_blacklisted(&record("/avatar/parameters/Hat")));
        assert!(rules.is_blacklisted(&record("/avatar/parameters/Tail/Wag")));
        assert!(!rules.is_blacklisted(&record("/avatar/parameters/VelocityX")));
    }
}
