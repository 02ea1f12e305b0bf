use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{loader::ImportOptions, raytracing::CatalogEntry, scene::FilterMode};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub models: Vec<CatalogEntry>,
    pub min_filter: FilterMode,
    pub selected_model: usize,
    pub import: ImportOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models: vec![CatalogEntry {
                name: "cube".to_string(),
                path: PathBuf::from("assets/models/cube.obj"),
            }],
            min_filter: FilterMode::default(),
            selected_model: 0,
            import: ImportOptions::default(),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(value)?)
    }
}

pub struct ConfigFileLoader {
    pub path: PathBuf,
    config: Option<Config>,
}

impl ConfigFileLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config: None,
        }
    }

    /// Reads the config file. A missing file is created with the default config.
    pub fn load_config(&mut self) -> Result<&mut Config, ConfigError> {
        let config = match std::fs::read_to_string(&self.path) {
            Ok(content) => content.parse::<Config>()?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Writing default config to {}", self.path.display());
                self.config = Some(Config::default());
                self.save_config()?;
                Config::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(self.config.insert(config))
    }

    pub fn get_or_load_config(&mut self) -> Result<&mut Config, ConfigError> {
        match self.config {
            Some(ref mut config) => Ok(config),
            None => self.load_config(),
        }
    }

    pub fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(config) = &self.config {
            let content = serde_json::to_string_pretty(config)?;
            std::fs::write(&self.path, content).map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_get_the_default_config() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("config.json");

        let mut loader = ConfigFileLoader::new(&path);
        assert_eq!(*loader.load_config().unwrap(), Config::default());
        assert!(path.exists());

        let mut reloaded = ConfigFileLoader::new(&path);
        assert_eq!(*reloaded.get_or_load_config().unwrap(), Config::default());
    }

    #[test]
    fn partial_configs_use_defaults() {
        let config: Config = r#"{ "min_filter": "nearest", "import": { "flip_uvs": false } }"#
            .parse()
            .unwrap();
        assert_eq!(config.min_filter, FilterMode::Nearest);
        assert!(!config.import.flip_uvs);
        assert!(config.import.generate_smooth_normals);
        assert_eq!(config.models, Config::default().models);
    }

    #[test]
    fn malformed_configs_are_errors() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("config.json");
        std::fs::write(&path, "{ models: ").unwrap();

        assert!(matches!(
            ConfigFileLoader::new(&path).load_config(),
            Err(ConfigError::Parse(_))
        ));
    }
}
