use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{ConversionSettings, DEFAULT_MIN_FREE_SPACE_MB};
use crate::error::ConfigError;

const CONFIG_DIR_NAME: &str = "towebp";
const CONFIG_FILE_NAME: &str = "config.json";
const FALLBACK_PROFILE: &str = "balanced";

/// The persisted part of [`ConversionSettings`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub quality: u8,
    pub lossless: bool,
    pub preserve_timestamps: bool,
    pub preserve_originals: bool,
}

impl Profile {
    const fn new(
        quality: u8,
        lossless: bool,
        preserve_timestamps: bool,
        preserve_originals: bool,
    ) -> Self {
        Self {
            quality,
            lossless,
            preserve_timestamps,
            preserve_originals,
        }
    }

    pub fn to_settings(self) -> ConversionSettings {
        ConversionSettings {
            quality: self.quality,
            lossless: self.lossless,
            preserve_timestamps: self.preserve_timestamps,
            preserve_originals: self.preserve_originals,
            ..ConversionSettings::default()
        }
    }
}

impl From<&ConversionSettings> for Profile {
    fn from(settings: &ConversionSettings) -> Self {
        Self::new(
            settings.quality,
            settings.lossless,
            settings.preserve_timestamps,
            settings.preserve_originals,
        )
    }
}

/// Built-in profiles; these names cannot be overwritten
pub const PRESET_PROFILES: &[(&str, Profile)] = &[
    ("high_quality", Profile::new(95, true, true, true)),
    ("balanced", Profile::new(80, false, true, true)),
    ("web_optimized", Profile::new(75, false, false, true)),
    ("space_saver", Profile::new(60, false, false, false)),
];

fn preset(name: &str) -> Option<Profile> {
    PRESET_PROFILES
        .iter()
        .find(|(preset_name, _)| *preset_name == name)
        .map(|(_, profile)| *profile)
}

/// On-disk layout of the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreData {
    pub default_profile: String,
    pub last_used_settings: Option<Profile>,
    pub custom_profiles: BTreeMap<String, Profile>,
    pub min_free_space_mb: u64,
    pub max_workers: Option<usize>,
}

impl Default for StoreData {
    fn default() -> Self {
        Self {
            default_profile: FALLBACK_PROFILE.to_string(),
            last_used_settings: None,
            custom_profiles: BTreeMap::new(),
            min_free_space_mb: DEFAULT_MIN_FREE_SPACE_MB,
            max_workers: None,
        }
    }
}

/// Profile store bound to one JSON file
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
    data: StoreData,
}

impl ProfileStore {
    /// Default location: `<config dir>/towebp/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .context("Could not determine a configuration directory")?;
        Ok(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::open(Self::default_path()?))
    }

    /// Load the store at `path`; a missing or unreadable file yields defaults
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match Self::load(&path) {
            Ok(Some(data)) => data,
            Ok(None) => StoreData::default(),
            Err(e) => {
                log::warn!("Error loading config {}: {:#}", path.display(), e);
                StoreData::default()
            }
        };
        Self { path, data }
    }

    fn load(path: &Path) -> Result<Option<StoreData>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let data = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(data))
    }

    /// Write the store back to disk, creating its directory if needed
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &StoreData {
        &self.data
    }

    pub fn default_profile(&self) -> &str {
        &self.data.default_profile
    }

    /// Look up a profile; `None` means the default profile.
    ///
    /// Custom profiles shadow presets of the same name.
    pub fn get_profile(&self, name: Option<&str>) -> Result<Profile, ConfigError> {
        let name = name.unwrap_or(&self.data.default_profile);
        self.data
            .custom_profiles
            .get(name)
            .copied()
            .or_else(|| preset(name))
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// All profiles, presets first, then custom ones by name
    pub fn list_profiles(&self) -> Vec<(String, Profile)> {
        PRESET_PROFILES
            .iter()
            .filter(|(name, _)| !self.data.custom_profiles.contains_key(*name))
            .map(|(name, profile)| (name.to_string(), *profile))
            .chain(
                self.data
                    .custom_profiles
                    .iter()
                    .map(|(name, profile)| (name.clone(), *profile)),
            )
            .collect()
    }

    pub fn save_custom_profile(&mut self, name: &str, profile: Profile) -> Result<()> {
        if preset(name).is_some() {
            return Err(ConfigError::ReadOnlyProfile(name.to_string()).into());
        }
        self.data.custom_profiles.insert(name.to_string(), profile);
        self.save()
    }

    /// Returns whether a profile by that name existed
    pub fn delete_custom_profile(&mut self, name: &str) -> Result<bool> {
        if self.data.custom_profiles.remove(name).is_none() {
            return Ok(false);
        }
        if self.data.default_profile == name {
            self.data.default_profile = FALLBACK_PROFILE.to_string();
        }
        self.save()?;
        Ok(true)
    }

    pub fn set_default_profile(&mut self, name: &str) -> Result<()> {
        self.get_profile(Some(name))?;
        self.data.default_profile = name.to_string();
        self.save()
    }

    pub fn last_used(&self) -> Option<Profile> {
        self.data.last_used_settings
    }

    pub fn save_last_used(&mut self, profile: Profile) -> Result<()> {
        self.data.last_used_settings = Some(profile);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> ProfileStore {
        ProfileStore::open(dir.join("nested").join(CONFIG_FILE_NAME))
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store_in(temp_dir.path());
        assert_eq!(store.data(), &StoreData::default());
        assert_eq!(store.get_profile(None).unwrap(), preset("balanced").unwrap());
    }

    #[test]
    fn test_unknown_profile_is_config_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store_in(temp_dir.path());
        assert_eq!(
            store.get_profile(Some("ultra")),
            Err(ConfigError::UnknownProfile("ultra".to_string()))
        );
    }

    #[test]
    fn test_custom_profiles_persist_across_opens() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = store_in(temp_dir.path());
        let mine = Profile::new(55, false, true, false);
        store.save_custom_profile("mine", mine).unwrap();
        store.set_default_profile("mine").unwrap();
        store.save_last_used(Profile::new(70, true, false, true)).unwrap();

        let reopened = store_in(temp_dir.path());
        assert_eq!(reopened.get_profile(Some("mine")).unwrap(), mine);
        assert_eq!(reopened.default_profile(), "mine");
        assert_eq!(reopened.get_profile(None).unwrap(), mine);
        assert_eq!(reopened.last_used(), Some(Profile::new(70, true, false, true)));
        assert_eq!(reopened.list_profiles().len(), PRESET_PROFILES.len() + 1);
    }

    #[test]
    fn test_presets_are_read_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = store_in(temp_dir.path());
        let err = store
            .save_custom_profile("balanced", Profile::new(1, false, false, false))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::ReadOnlyProfile("balanced".to_string()))
        );
    }

    #[test]
    fn test_set_default_rejects_unknown_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = store_in(temp_dir.path());
        assert!(store.set_default_profile("nope").is_err());
        assert_eq!(store.default_profile(), FALLBACK_PROFILE);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_deleting_default_profile_falls_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = store_in(temp_dir.path());
        store.save_custom_profile("tmp", Profile::new(10, false, false, true)).unwrap();
        store.set_default_profile("tmp").unwrap();

        assert!(store.delete_custom_profile("tmp").unwrap());
        assert!(!store.delete_custom_profile("tmp").unwrap());
        assert_eq!(store.default_profile(), FALLBACK_PROFILE);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        let store = ProfileStore::open(&path);
        assert_eq!(store.data(), &StoreData::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"default_profile": "space_saver", "max_workers": 2}"#).unwrap();

        let store = ProfileStore::open(&path);
        assert_eq!(store.default_profile(), "space_saver");
        assert_eq!(store.data().max_workers, Some(2));
        assert_eq!(store.data().min_free_space_mb, DEFAULT_MIN_FREE_SPACE_MB);
        assert!(!store.get_profile(None).unwrap().preserve_originals);
    }
}
