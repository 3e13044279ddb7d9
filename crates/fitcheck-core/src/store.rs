//! File-backed preset storage
//!
//! Directory structure:
//! ```text
//! presets/
//! ├── avtr_0a1b.../
//! │   ├── Default.json
//! │   └── Photo.json
//! └── avtr_9f8e.../
//!     └── Casual.json
//! ```
//!
//! The in-memory index mirrors the files on disk. Every write goes through
//! [`write_atomic`], and a store mutation touches the index only after the
//! disk side succeeded. The store has no internal locking; callers serialize
//! mutations.

use crate::blacklist::BlacklistRules;
use crate::config::write_atomic;
use crate::endpoint::AvatarEndpoint;
use crate::error::{FitCheckError, Result};
use crate::types::AvatarPreset;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Readiness threshold used when apply switches avatars
///
/// The first announcements are enough to confirm the switch landed.
const SWITCH_MIN_PARAMS: usize = 1;

const PRESET_EXTENSION: &str = "json";

/// Outcome of replaying a preset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub avatar_id: String,
    pub preset: String,
    /// Whether an avatar change was requested first
    pub switched: bool,
    pub sent: usize,
    /// Names of blacklisted parameters that were not sent
    pub skipped: Vec<String>,
}

/// Preset index backed by one JSON file per preset
pub struct PresetStore {
    root: PathBuf,
    presets: BTreeMap<String, BTreeMap<String, AvatarPreset>>,
    blacklist: BlacklistRules,
}

impl PresetStore {
    /// Create an empty store rooted at `root`; call
    /// [`parse_existing`](Self::parse_existing) to load it
    pub fn new(root: PathBuf, blacklist: BlacklistRules) -> Self {
        Self {
            root,
            presets: BTreeMap::new(),
            blacklist,
        }
    }

    /// Create a store and load every preset under `root`
    pub fn open(root: PathBuf, blacklist: BlacklistRules) -> Result<Self> {
        let mut store = Self::new(root, blacklist);
        store.parse_existing()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the backing file for a preset
    pub fn preset_path(&self, avatar_id: &str, preset_name: &str) -> PathBuf {
        self.root
            .join(avatar_id)
            .join(format!("{}.{}", preset_name, PRESET_EXTENSION))
    }

    /// Rebuild the index from disk
    ///
    /// Hidden entries are skipped. A corrupt file is logged and skipped
    /// without aborting the scan. Presets are keyed by their directory and
    /// file stem; stored `name`/`avatarId` fields are normalized to match.
    pub fn parse_existing(&mut self) -> Result<usize> {
        self.presets.clear();

        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
            log::info!("Presets: Created {:?}", self.root);
            return Ok(0);
        }

        let mut count = 0;
        for avatar_dir in sorted_entries(&self.root)? {
            if !avatar_dir.is_dir() {
                continue;
            }
            let Some(avatar_id) = visible_name(&avatar_dir) else {
                continue;
            };

            match self.load_avatar_dir(&avatar_dir, &avatar_id) {
                Ok(loaded) => count += loaded,
                Err(e) => log::warn!("Presets: Skipping unreadable {:?}: {}", avatar_dir, e),
            }
        }

        log::info!(
            "Presets: Loaded {} presets for {} avatars from {:?}",
            count,
            self.presets.len(),
            self.root
        );
        Ok(count)
    }

    /// Load every preset file of one avatar directory
    ///
    /// Fails only if the directory cannot be listed; corrupt files are
    /// skipped.
    fn load_avatar_dir(&mut self, avatar_dir: &Path, avatar_id: &str) -> Result<usize> {
        let mut count = 0;
        for file in sorted_entries(avatar_dir)? {
            if !file.is_file()
                || file.extension().and_then(|e| e.to_str()) != Some(PRESET_EXTENSION)
            {
                continue;
            }
            let Some(stem) = visible_stem(&file) else {
                continue;
            };

            match load_preset_file(&file) {
                Ok(mut preset) => {
                    if preset.name != stem || preset.avatar_id != avatar_id {
                        log::debug!(
                            "Presets: Normalizing {:?} (stored as {}/{})",
                            file,
                            preset.avatar_id,
                            preset.name
                        );
                    }
                    preset.name = stem.clone();
                    preset.avatar_id = avatar_id.to_string();
                    self.presets
                        .entry(avatar_id.to_string())
                        .or_default()
                        .insert(stem, preset);
                    count += 1;
                }
                Err(e) => log::warn!("Presets: Skipping {}", e),
            }
        }
        Ok(count)
    }

    /// Snapshot the live avatar into a preset named `preset_name`
    ///
    /// The snapshot is unfiltered. An existing preset of the same name for
    /// the same avatar is replaced.
    pub fn save<E: AvatarEndpoint + ?Sized>(
        &mut self,
        endpoint: &mut E,
        preset_name: &str,
    ) -> Result<AvatarPreset> {
        validate_name(preset_name)?;
        let avatar_id = endpoint.avatar_id()?;
        let parameters = endpoint.avatar_params()?;

        let preset = AvatarPreset::new(preset_name, avatar_id, parameters);
        self.save_preset(preset.clone())?;
        Ok(preset)
    }

    /// Persist an already-built preset, replacing any existing one
    pub fn save_preset(&mut self, preset: AvatarPreset) -> Result<()> {
        validate_name(&preset.name)?;
        validate_avatar_id(&preset.avatar_id)?;

        let path = self.preset_path(&preset.avatar_id, &preset.name);
        write_atomic(&path, preset.to_json()?.as_bytes())?;
        log::info!(
            "Presets: Saved {}/{} ({} parameters)",
            preset.avatar_id,
            preset.name,
            preset.parameters.len()
        );

        self.presets
            .entry(preset.avatar_id.clone())
            .or_default()
            .insert(preset.name.clone(), preset);
        Ok(())
    }

    /// Exact lookup
    pub fn find(&self, avatar_id: &str, preset_name: &str) -> Result<&AvatarPreset> {
        self.presets
            .get(avatar_id)
            .and_then(|presets| presets.get(preset_name))
            .ok_or_else(|| FitCheckError::PresetNotFound {
                avatar_id: avatar_id.to_string(),
                preset: preset_name.to_string(),
            })
    }

    /// Resolve a preset by name only
    ///
    /// The live avatar's preset wins; otherwise the name must be unique
    /// across avatars.
    pub fn resolve(&self, live_avatar_id: &str, preset_name: &str) -> Result<&AvatarPreset> {
        if let Ok(preset) = self.find(live_avatar_id, preset_name) {
            return Ok(preset);
        }

        let matches: Vec<&AvatarPreset> = self
            .presets
            .values()
            .filter_map(|presets| presets.get(preset_name))
            .collect();

        match matches.as_slice() {
            [] => Err(FitCheckError::PresetNotFound {
                avatar_id: live_avatar_id.to_string(),
                preset: preset_name.to_string(),
            }),
            [preset] => Ok(preset),
            several => Err(FitCheckError::AmbiguousPreset {
                preset: preset_name.to_string(),
                avatar_ids: several.iter().map(|p| p.avatar_id.clone()).collect(),
            }),
        }
    }

    /// Remove a preset's file and then its index entry
    ///
    /// Fails with [`FitCheckError::PresetFileMissing`] if the file is already
    /// gone; the index is left untouched in that case.
    pub fn delete(&mut self, avatar_id: &str, preset_name: &str) -> Result<AvatarPreset> {
        self.find(avatar_id, preset_name)?;

        let path = self.preset_path(avatar_id, preset_name);
        if !path.is_file() {
            return Err(FitCheckError::PresetFileMissing(path));
        }
        fs::remove_file(&path)?;

        let removed = self.remove_entry(avatar_id, preset_name).ok_or_else(|| {
            FitCheckError::PresetNotFound {
                avatar_id: avatar_id.to_string(),
                preset: preset_name.to_string(),
            }
        })?;
        log::info!("Presets: Deleted {}/{}", avatar_id, preset_name);
        Ok(removed)
    }

    /// Rename a preset in place
    ///
    /// The file is moved with a filesystem rename and then rewritten with the
    /// new name, so the preset is never absent from disk.
    pub fn rename(
        &mut self,
        avatar_id: &str,
        preset_name: &str,
        new_name: &str,
    ) -> Result<&AvatarPreset> {
        validate_name(new_name)?;
        let mut renamed = self.find(avatar_id, preset_name)?.clone();

        if new_name != preset_name {
            let old_path = self.preset_path(avatar_id, preset_name);
            let new_path = self.preset_path(avatar_id, new_name);

            if self.find(avatar_id, new_name).is_ok() || new_path.exists() {
                return Err(FitCheckError::PresetAlreadyExists {
                    avatar_id: avatar_id.to_string(),
                    preset: new_name.to_string(),
                });
            }
            if !old_path.is_file() {
                return Err(FitCheckError::PresetFileMissing(old_path));
            }

            fs::rename(&old_path, &new_path)?;
            renamed.name = new_name.to_string();
            let written = renamed
                .to_json()
                .and_then(|json| write_atomic(&new_path, json.as_bytes()).map_err(Into::into));
            if let Err(e) = written {
                // Put the file back so disk still matches the index
                if let Err(undo) = fs::rename(&new_path, &old_path) {
                    log::error!("Presets: Could not restore {:?}: {}", old_path, undo);
                }
                return Err(e);
            }

            self.remove_entry(avatar_id, preset_name);
            self.presets
                .entry(avatar_id.to_string())
                .or_default()
                .insert(new_name.to_string(), renamed);
            log::info!("Presets: Renamed {}/{} -> {}", avatar_id, preset_name, new_name);
        }

        self.find(avatar_id, new_name)
    }

    /// Apply a preset selected by name only (see [`resolve`](Self::resolve))
    pub fn apply<E: AvatarEndpoint + ?Sized>(
        &mut self,
        endpoint: &mut E,
        preset_name: &str,
    ) -> Result<ApplyReport> {
        let live_avatar_id = endpoint.avatar_id()?;
        let preset = self.resolve(&live_avatar_id, preset_name)?.clone();
        self.replay(endpoint, &live_avatar_id, &preset)
    }

    /// Apply the preset stored under (`avatar_id`, `preset_name`)
    pub fn apply_preset<E: AvatarEndpoint + ?Sized>(
        &mut self,
        endpoint: &mut E,
        avatar_id: &str,
        preset_name: &str,
    ) -> Result<ApplyReport> {
        let live_avatar_id = endpoint.avatar_id()?;
        let preset = self.find(avatar_id, preset_name)?.clone();
        self.replay(endpoint, &live_avatar_id, &preset)
    }

    /// Switch avatars if needed, then send every non-blacklisted parameter
    ///
    /// Strictly sequential: nothing is sent until the switch has been
    /// confirmed. Parameters already sent stay applied if a later send fails.
    fn replay<E: AvatarEndpoint + ?Sized>(
        &self,
        endpoint: &mut E,
        live_avatar_id: &str,
        preset: &AvatarPreset,
    ) -> Result<ApplyReport> {
        let switched = live_avatar_id != preset.avatar_id;
        if switched {
            log::info!(
                "Presets: Switching avatar {} -> {} for {}",
                live_avatar_id,
                preset.avatar_id,
                preset.name
            );
            let ready = endpoint.switch_avatar(&preset.avatar_id, SWITCH_MIN_PARAMS)?;
            if ready != preset.avatar_id {
                log::warn!(
                    "Presets: Application reported avatar {} after requesting {}",
                    ready,
                    preset.avatar_id
                );
            }
        }

        endpoint.refresh()?;

        let mut sent = 0;
        let mut skipped = Vec::new();
        for parameter in &preset.parameters {
            if self.blacklist.is_blacklisted(parameter) {
                log::debug!("Presets: Skipping blacklisted {}", parameter.path());
                skipped.push(parameter.name().to_string());
                continue;
            }
            endpoint.send_parameter(parameter.path(), parameter.value())?;
            sent += 1;
        }

        log::info!(
            "Presets: Applied {}/{} ({} sent, {} skipped)",
            preset.avatar_id,
            preset.name,
            sent,
            skipped.len()
        );

        Ok(ApplyReport {
            avatar_id: preset.avatar_id.clone(),
            preset: preset.name.clone(),
            switched,
            sent,
            skipped,
        })
    }

    /// Avatar ids that have at least one preset, sorted
    pub fn avatar_ids(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }

    /// Presets of one avatar, sorted by name
    pub fn presets_for(&self, avatar_id: &str) -> Vec<&AvatarPreset> {
        self.presets
            .get(avatar_id)
            .map(|presets| presets.values().collect())
            .unwrap_or_default()
    }

    /// Total number of presets
    pub fn len(&self) -> usize {
        self.presets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    fn remove_entry(&mut self, avatar_id: &str, preset_name: &str) -> Option<AvatarPreset> {
        let presets = self.presets.get_mut(avatar_id)?;
        let removed = presets.remove(preset_name);
        if presets.is_empty() {
            self.presets.remove(avatar_id);
        }
        removed
    }
}

/// Preset names become file names
fn validate_name(name: &str) -> Result<()> {
    if is_safe_component(name) {
        Ok(())
    } else {
        Err(FitCheckError::InvalidPresetName(name.to_string()))
    }
}

/// Avatar ids become directory names
fn validate_avatar_id(avatar_id: &str) -> Result<()> {
    if is_safe_component(avatar_id) {
        Ok(())
    } else {
        Err(FitCheckError::InvalidValue {
            path: crate::types::AVATAR_CHANGE_ADDRESS.to_string(),
            reason: format!("avatar id '{}' is not usable as a directory name", avatar_id),
        })
    }
}

fn is_safe_component(s: &str) -> bool {
    !s.trim().is_empty()
        && !s.starts_with('.')
        && !s.contains(['/', '\\'])
        && !s.contains('\0')
}

fn load_preset_file(path: &Path) -> Result<AvatarPreset> {
    let corrupt = |reason: String| FitCheckError::PresetFileCorrupt {
        path: path.to_path_buf(),
        reason,
    };
    let contents = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
    AvatarPreset::from_json(&contents).map_err(|e| corrupt(e.to_string()))
}

/// Directory entries sorted by file name for a stable scan order
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();
    Ok(entries)
}

fn visible_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    (!name.starts_with('.')).then(|| name.to_string())
}

fn visible_stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    (!stem.is_empty() && !stem.starts_with('.')).then(|| stem.to_string())
}
