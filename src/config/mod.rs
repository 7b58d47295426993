// Configuration management for bangcatalog
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionSettings,
    pub logging: LoggingConfig,
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// File holding the provider's application key bytes.
    pub key_file: PathBuf,
    pub cache_location: PathBuf,
    pub settings_location: PathBuf,
    pub user_agent: String,
    pub compress_playlists: bool,
    pub dont_save_metadata_for_playlists: bool,
    pub initially_unload_playlists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub max_pump_delay_ms: u64,
}

fn base_dir() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bangcatalog")
}

impl Default for SessionSettings {
    fn default() -> Self {
        let base = base_dir();
        Self {
            key_file: base.join("appkey.key"),
            cache_location: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("tmp"))
                .join("bangcatalog"),
            settings_location: base.join("settings"),
            user_agent: "bangcatalog".to_string(),
            compress_playlists: true,
            dont_save_metadata_for_playlists: false,
            initially_unload_playlists: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: base_dir().join("logs"),
            filter: "info,bangcatalog=debug".to_string(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_pump_delay_ms: 250,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Reads `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("bangcatalog");

        Ok(config_dir.join("config.toml"))
    }
}

impl SessionSettings {
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        let application_key = fs::read(&self.key_file)
            .with_context(|| format!("reading application key {}", self.key_file.display()))?;
        Ok(SessionConfig {
            application_key,
            cache_location: self.cache_location.clone(),
            settings_location: self.settings_location.clone(),
            user_agent: self.user_agent.clone(),
            compress_playlists: self.compress_playlists,
            dont_save_metadata_for_playlists: self.dont_save_metadata_for_playlists,
            initially_unload_playlists: self.initially_unload_playlists,
        })
    }
}

impl DriverConfig {
    pub fn max_pump_delay(&self) -> Duration {
        Duration::from_millis(self.max_pump_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());
        assert!(config.session.compress_playlists);
    }

    #[test]
    fn saved_changes_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.driver.max_pump_delay_ms = 40;
        config.session.user_agent = "tests".into();
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.driver.max_pump_delay(), Duration::from_millis(40));
        assert_eq!(reloaded.session.user_agent, "tests");
    }

    #[test]
    fn session_config_reads_key_bytes() {
        let dir = tempdir().unwrap();
        let mut settings = Config::default().session;
        settings.key_file = dir.path().join("appkey.key");
        fs::write(&settings.key_file, [1u8, 2, 3]).unwrap();

        let session = settings.to_session_config().unwrap();
        assert_eq!(session.application_key, vec![1, 2, 3]);
        assert!(session.compress_playlists);
    }

    #[test]
    fn missing_key_file_is_an_error() {
        let dir = tempdir().unwrap();
        let mut settings = Config::default().session;
        settings.key_file = dir.path().join("absent.key");
        assert!(settings.to_session_config().is_err());
    }

    #[test]
    fn garbage_config_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "session = 3").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[logging]\nfilter = \"warn\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.logging.filter, "warn");
        assert_eq!(config.logging.directory, LoggingConfig::default().directory);
        assert_eq!(config.driver, DriverConfig::default());
        assert_eq!(config.session, SessionSettings::default());
    }
}
