//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use memo_core::util::normalize_text_option;
use memo_core::{Identity, SyncConfig};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "cli-config.json";
const APP_DIR_NAME: &str = "memo";
pub const CONFIG_PATH_ENV: &str = "MEMO_CONFIG";
pub const DATA_DIR_ENV: &str = "MEMO_DATA_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    /// Local record directory; the platform data dir when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Shared remote store directory
    #[serde(default)]
    pub remote_dir: Option<PathBuf>,
    /// Signed-in identity
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub sync: SyncConfig,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

pub fn default_data_dir() -> Result<PathBuf, String> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| "Failed to resolve CLI data directory".to_string())
}

/// Config path from the flag, then `MEMO_CONFIG`, then the platform default.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, String> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    default_config_path()
}

impl CliConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Data dir from the flag, then `MEMO_DATA_DIR`, then config, then the
    /// platform default.
    pub fn resolve_data_dir(&self, explicit: Option<PathBuf>) -> Result<PathBuf, String> {
        if let Some(dir) = explicit {
            return Ok(dir);
        }
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        if let Some(dir) = self.data_dir.clone() {
            return Ok(dir);
        }
        default_data_dir()
    }

    /// Signed-in identity, if any. A malformed stored value is an error
    /// rather than a silent sign-out.
    pub fn identity(&self) -> Result<Option<Identity>, String> {
        self.identity
            .as_deref()
            .map(|raw| {
                Identity::parse(raw).map_err(|error| format!("Stored identity is invalid: {error}"))
            })
            .transpose()
    }

    fn normalize(&mut self) {
        self.identity = normalize_text_option(self.identity.take());
        self.data_dir = self
            .data_dir
            .take()
            .filter(|dir| !dir.as_os_str().is_empty());
        self.remote_dir = self
            .remote_dir
            .take()
            .filter(|dir| !dir.as_os_str().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_config_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.identity().unwrap(), None);
    }

    #[test]
    fn config_roundtrip_normalizes_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = CliConfig {
            version: 1,
            data_dir: Some(PathBuf::new()),
            remote_dir: Some(PathBuf::from("/srv/memo")),
            identity: Some("  alice  ".to_string()),
            sync: SyncConfig {
                remote_push_debounce_ms: 50,
                ..SyncConfig::default()
            },
        };
        config.save_to_path(&path).unwrap();

        let loaded = CliConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.identity.as_deref(), Some("alice"));
        assert_eq!(loaded.data_dir, None);
        assert_eq!(loaded.remote_dir, Some(PathBuf::from("/srv/memo")));
        assert_eq!(loaded.sync.remote_push_debounce_ms, 50);
        assert_eq!(loaded.identity().unwrap().unwrap().as_str(), "alice");
    }

    #[test]
    fn invalid_stored_identity_is_reported() {
        let config = CliConfig {
            identity: Some("../escape".to_string()),
            ..CliConfig::default()
        };
        assert!(config.identity().is_err());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(CliConfig::load_from_path(&path).is_err());
    }

    #[test]
    fn explicit_data_dir_wins() {
        let config = CliConfig {
            data_dir: Some(PathBuf::from("/from/config")),
            ..CliConfig::default()
        };
        assert_eq!(
            config
                .resolve_data_dir(Some(PathBuf::from("/from/flag")))
                .unwrap(),
            PathBuf::from("/from/flag")
        );
    }
}
