pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

pub const BACKEND_URL_ENV: &str = "AGENT_BACKEND_URL";
pub const BACKEND_API_KEY_ENV: &str = "AGENT_API_KEY";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Overall timeout for a backend call, in seconds. Covers the whole
    /// streamed body, so keep it generous.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    600
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
        }
    }
}

/// Agent backend address and credential.
///
/// Both values are optional at load time: a relay without them still starts,
/// and every chat request is answered with a configuration error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
}

fn default_stream_path() -> String {
    "/chat/stream".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            stream_path: default_stream_path(),
        }
    }
}

impl BackendConfig {
    /// Names of the settings that are still missing, in the order they are
    /// reported to clients.
    #[must_use]
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(self.base_url.as_deref()) {
            missing.push(BACKEND_URL_ENV);
        }
        if is_blank(self.api_key.as_deref()) {
            missing.push(BACKEND_API_KEY_ENV);
        }
        missing
    }

    /// Override file values with `AGENT_BACKEND_URL` / `AGENT_API_KEY` when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(BACKEND_URL_ENV).ok(),
            std::env::var(BACKEND_API_KEY_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, base_url: Option<String>, api_key: Option<String>) {
        if let Some(url) = base_url.filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(url);
        }
        if let Some(key) = api_key.filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(key);
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate it. A missing file yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    config.backend.apply_env_overrides();
    validate_config(&config)?;
    Ok(config)
}

/// Parse YAML text into an [`AppConfig`] without touching the environment.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when the text is not a valid config document.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r"
server:
  port: 8080
  base_path: /relay
backend:
  base_url: http://agent.internal:8000
  api_key: secret
features:
  log_level: DEBUG
",
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.base_path, "/relay");
        assert_eq!(config.server.timeout, 600);
        assert_eq!(
            config.backend.base_url.as_deref(),
            Some("http://agent.internal:8000")
        );
        assert_eq!(config.backend.stream_path, "/chat/stream");
        assert!(config.backend.missing_settings().is_empty());
        assert_eq!(config.features.log_level, "DEBUG");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(
            config.backend.missing_settings(),
            vec![BACKEND_URL_ENV, BACKEND_API_KEY_ENV]
        );
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let backend = BackendConfig {
            base_url: Some("http://agent".to_string()),
            api_key: Some("  ".to_string()),
            ..BackendConfig::default()
        };
        assert_eq!(backend.missing_settings(), vec![BACKEND_API_KEY_ENV]);
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut backend = BackendConfig {
            base_url: Some("http://from-file".to_string()),
            api_key: None,
            ..BackendConfig::default()
        };
        backend.apply_overrides(
            Some("http://from-env".to_string()),
            Some("env-key".to_string()),
        );
        assert_eq!(backend.base_url.as_deref(), Some("http://from-env"));
        assert_eq!(backend.api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn test_empty_overrides_are_ignored() {
        let mut backend = BackendConfig {
            base_url: Some("http://from-file".to_string()),
            api_key: Some("file-key".to_string()),
            ..BackendConfig::default()
        };
        backend.apply_overrides(Some(String::new()), None);
        assert_eq!(backend.base_url.as_deref(), Some("http://from-file"));
        assert_eq!(backend.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn test_api_key_is_never_serialized() {
        let config = AppConfig {
            backend: BackendConfig {
                api_key: Some("secret".to_string()),
                ..BackendConfig::default()
            },
            ..AppConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("secret"));
    }
}
