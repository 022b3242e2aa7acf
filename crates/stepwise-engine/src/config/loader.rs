use super::schema::StepwiseConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./stepwise.yaml
    /// 2. ~/.stepwise/config.yaml
    /// 3. Default configuration
    ///
    /// Environment overrides for the LLM section are applied last.
    pub async fn load_default() -> Result<StepwiseConfig, ConfigError> {
        let mut config = match Self::default_location() {
            Some(path) => Self::read(&path).await?,
            None => StepwiseConfig::default(),
        };
        config.llm.apply_env_overrides();
        Ok(config)
    }

    pub async fn load_from(path: &Path) -> Result<StepwiseConfig, ConfigError> {
        let mut config = Self::read(path).await?;
        config.llm.apply_env_overrides();
        Ok(config)
    }

    fn default_location() -> Option<PathBuf> {
        // Check current directory
        let local_config = PathBuf::from("./stepwise.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        // Check home directory
        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".stepwise").join("config.yaml");
            if home_config.exists() {
                return Some(home_config);
            }
        }
        None
    }

    async fn read(path: &Path) -> Result<StepwiseConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        // An empty file is a valid, all-defaults config.
        if content.trim().is_empty() {
            return Ok(StepwiseConfig::default());
        }
        let config: StepwiseConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
