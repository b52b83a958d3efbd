use crate::error::{Error, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Backend settings for one FriendlyChat project.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub api_key: String,
    pub project_id: String,
    pub app_id: String,
    pub database_url: String,
    pub storage_bucket: String,
    /// Disables the remote config cache so every resume refetches.
    pub developer_mode: bool,
    pub instance_id: String,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // TOML is the primary format; a JSON file from older builds is migrated on first load.
    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("friendlychat.toml"))
    }

    fn legacy_json_path() -> Option<PathBuf> {
        let proj = ProjectDirs::from("com", "google", "FriendlyChat")?;
        Some(proj.config_dir().join("config.json"))
    }

    pub fn load() -> Self {
        let toml_path = Self::toml_path();
        let legacy = Self::legacy_json_path();
        Self::load_from(toml_path.as_deref(), legacy.as_deref())
    }

    /// Loads from `toml_path`, falling back to `legacy_json` (re-saved as
    /// TOML) and finally to an empty config.
    pub fn load_from(toml_path: Option<&Path>, legacy_json: Option<&Path>) -> Self {
        if let Some(path) = toml_path {
            if let Ok(text) = fs::read_to_string(path) {
                match toml::from_str::<AppConfig>(&text) {
                    Ok(config) => return config,
                    Err(e) => log::warn!("ignoring unreadable config {}: {}", path.display(), e),
                }
            }
        }

        if let Some(legacy) = legacy_json {
            if let Ok(bytes) = fs::read(legacy) {
                if let Ok(config) = serde_json::from_slice::<AppConfig>(&bytes) {
                    if let Some(path) = toml_path {
                        if let Err(e) = config.save_to(path) {
                            log::warn!("could not migrate legacy config: {}", e);
                        }
                    }
                    return config;
                }
            }
        }

        Self::new()
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::toml_path()
            .ok_or_else(|| Error::Config("no config directory available".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("api_key", &self.api_key),
            ("project_id", &self.project_id),
            ("database_url", &self.database_url),
            ("storage_bucket", &self.storage_bucket),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} is required", field)));
            }
        }
        url::Url::parse(&self.database_url)?;
        Ok(())
    }

    /// Assigns a per-install identifier used by the remote config fetch.
    /// Returns true when a new id was generated.
    pub fn ensure_instance_id(&mut self) -> bool {
        if !self.instance_id.is_empty() {
            return false;
        }
        self.instance_id = uuid::Uuid::new_v4().to_string();
        true
    }
}
