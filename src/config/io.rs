use std::env::current_exe;
use std::path::{Path, PathBuf};
use std::str;
use directories_next::ProjectDirs;
use log::{info, warn};
use tokio::fs;
use serde_json;

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to nuimo-controller.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // F:\nuimo-controller.exe => F:\nuimo-controller.json
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to nuimo-controller.json in an os dependent standard directory, such as
// ~/.config/nuimo-controller on linux.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "nuimo", "nuimo-controller").map(|dirs| {
        dirs.config_dir().join("nuimo-controller.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        if path.is_file() {
            return Ok(path);
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

#[derive(Debug, Clone)]
pub struct ConfigIO {
    path: PathBuf,
}

impl ConfigIO {
    /// Uses the portable config file when it exists, else the one in the user's config directory.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(ConfigIO { path: get_config_path()? })
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        ConfigIO { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        info!("Reading config file {}", self.path.to_string_lossy());

        let content = fs::read(&self.path).await?;
        if content.is_empty() {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    /// Like [`ConfigIO::read`], but a missing file means the defaults.
    pub async fn read_or_default(&self) -> Result<Config, ConfigError> {
        match self.read().await {
            Err(err) if err.is_file_not_found_error() => {
                // this is probably the first start
                info!("Config file not found, using defaults");
                Ok(Config::default())
            },
            result => result,
        }
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        info!("Saving config to {}", self.path.to_string_lossy());

        if let Some(directory) = self.path.parent() {
            fs::create_dir_all(directory).await?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::process;

    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("nuimo-controller-test-{}", process::id()))
            .join(name)
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let io = ConfigIO::from_path(scratch_path("missing.json"));

        assert!(io.read().await.unwrap_err().is_file_not_found_error());
        assert_eq!(io.read_or_default().await.unwrap(), Config::default());
    }

    #[tokio::test]
    async fn test_save_then_read() {
        let io = ConfigIO::from_path(scratch_path("saved.json"));
        let mut config = Config::default();
        config.device.address = Some("d3b48a8b91ac".to_string());
        config.display.brightness = 100;

        io.save(&config).await.unwrap();
        assert_eq!(io.read().await.unwrap(), config);

        fs::remove_file(io.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let io = ConfigIO::from_path(scratch_path("invalid.json"));
        fs::create_dir_all(io.path().parent().unwrap()).await.unwrap();
        fs::write(io.path(), b"{ not json").await.unwrap();

        assert!(matches!(io.read().await, Err(ConfigError::JsonError { .. })));

        fs::remove_file(io.path()).await.unwrap();
    }
}
