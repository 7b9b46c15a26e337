use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use pamigrate_backend::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Settings persisted between invocations in `config.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Operator of the last successful login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl AppConfig {
    pub fn backend_url<'a>(&'a self, flag: Option<&'a str>) -> &'a str {
        flag.or(self.backend_url.as_deref())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn request_timeout(&self, flag: Option<u64>) -> Duration {
        Duration::from_secs(
            flag.or(self.request_timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }
}

#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: &Path) -> Self {
        let path = config_dir.join("config.json");
        Self { path }
    }

    pub fn load(&self) -> Result<AppConfig> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Malformed {}", self.path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        }
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}
