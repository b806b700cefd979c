use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{errors::GazeError, format::SettingsOverride};

const CONFIG_DIR_NAME: &str = "gazeplotter";
const CONFIG_FILE_NAME: &str = "config.json";
const PROGRESS_EVERY_ROWS: usize = 5000;
const AXIS_STEPS: usize = 5;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Applied under any overrides given for a single ingestion
    pub default_override: SettingsOverride,
    pub parallel_file_parsing: bool,
    pub progress_every_rows: usize,
    pub axis_steps: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_override: SettingsOverride::default(),
            parallel_file_parsing: true,
            progress_every_rows: PROGRESS_EVERY_ROWS,
            axis_steps: AXIS_STEPS,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf, GazeError> {
        Ok(dirs::config_dir()
            .ok_or(GazeError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// Reads the user's config file, `None` when there isn't one yet.
    pub fn from_local_file() -> Result<Option<Self>, GazeError> {
        Self::from_path(&Self::config_path()?)
    }

    pub fn from_path(config_path: &Path) -> Result<Option<Self>, GazeError> {
        if !config_path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(config_path)
            .map_err(|e| GazeError::ConfigIOError { source: e })?;
        serde_json::from_reader(file)
            .map(Some)
            .map_err(|e| GazeError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), GazeError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), GazeError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GazeError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| GazeError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| GazeError::ConfigSerializeError { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::EyeFileType;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert_eq!(AppConfig::from_path(&dir.path().join("config.json")).unwrap(), None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            default_override: SettingsOverride {
                file_type: Some(EyeFileType::BeGaze),
                ..Default::default()
            },
            parallel_file_parsing: false,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::from_path(&path).unwrap(), Some(config));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"axis_steps": 8}"#).unwrap();
        let config = AppConfig::from_path(&path).unwrap().unwrap();
        assert_eq!(config.axis_steps, 8);
        assert!(config.parallel_file_parsing);
        assert_eq!(config.progress_every_rows, PROGRESS_EVERY_ROWS);
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            AppConfig::from_path(&path),
            Err(GazeError::ConfigSerializeError { .. })
        ));
    }
}
