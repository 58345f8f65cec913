use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration, read from a TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote API, e.g. `https://api.example.org/v1`
    pub api_url_base: String,
    /// Project every newly created observation is linked to
    pub project_id: Option<i64>,
    pub database_path: PathBuf,
    /// Queue entries older than this are dropped instead of replayed
    pub max_retention_days: i64,
    pub sync_interval_seconds: u64,
    pub retry_delay_seconds: u64,
    pub request_timeout_seconds: u64,
    /// Start a dependent drain as soon as a parent request succeeds
    pub eager_dependent_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url_base: "https://api.inaturalist.org/v1".to_string(),
            project_id: None,
            database_path: PathBuf::from("./data/wow-sync.db"),
            max_retention_days: 365,
            sync_interval_seconds: 30,
            retry_delay_seconds: 60,
            request_timeout_seconds: 60,
            eager_dependent_sync: true,
        }
    }
}

impl SyncConfig {
    pub fn from_toml(content: &str) -> Result<Self, AppError> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, AppError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let url = reqwest::Url::parse(&self.api_url_base).map_err(|e| {
            AppError::Config(format!("api_url_base '{}' is invalid: {}", self.api_url_base, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AppError::Config(format!(
                "api_url_base must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.max_retention_days <= 0 {
            return Err(AppError::Config(
                "max_retention_days must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL without a trailing slash, ready for joining paths
    pub fn api_base(&self) -> &str {
        self.api_url_base.trim_end_matches('/')
    }
}

/// Loads the configuration. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<SyncConfig, AppError> {
    if !path.exists() {
        log::info!(
            "No config at {}, using defaults",
            path.display()
        );
        return Ok(SyncConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    SyncConfig::from_toml(&content)
}

pub fn save_config(path: &Path, config: &SyncConfig) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, config.to_toml()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = SyncConfig::from_toml(
            r#"
api_url_base = "https://inat.example.org"
project_id = 7
"#,
        )
        .unwrap();
        assert_eq!(config.project_id, Some(7));
        assert_eq!(config.max_retention_days, 365);
        assert_eq!(config.sync_interval_seconds, 30);
        assert!(config.eager_dependent_sync);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let mut config = SyncConfig::default();
        config.project_id = Some(12);
        let text = config.to_toml().unwrap();
        assert_eq!(SyncConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = std::env::temp_dir().join(format!("wow-sync-{}", uuid::Uuid::new_v4()));
        let path = dir.join("wow-sync.toml");
        let mut config = SyncConfig::default();
        config.sync_interval_seconds = 90;

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejects_bad_url() {
        let result = SyncConfig::from_toml("api_url_base = \"ftp://example.org\"");
        assert!(matches!(result, Err(AppError::Config(_))));

        let result = SyncConfig::from_toml("api_url_base = \"not a url\"");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_api_base_trims_slash() {
        let mut config = SyncConfig::default();
        config.api_url_base = "https://inat.example.org/v1/".to_string();
        assert_eq!(config.api_base(), "https://inat.example.org/v1");
    }
}
