//! Global configuration for buildpod
//!
//! Located at `~/.config/buildpod/config.toml`

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Immutable descriptor for reaching the container engine.
///
/// Built once from configuration and shared read-only across driver calls.
/// The `uri` translates to a global `-H <uri>` flag on every engine
/// invocation; `env` is injected into the engine process environment
/// (DOCKER_CERT_PATH, DOCKER_TLS_VERIFY and friends).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineEndpoint {
    /// Engine CLI binary name
    pub binary: String,
    /// Remote engine URI (e.g. "tcp://10.0.0.2:2376"); None means local
    pub uri: Option<String>,
    /// Extra environment variables for engine invocations
    pub env: HashMap<String, String>,
}

impl Default for EngineEndpoint {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            uri: None,
            env: HashMap::new(),
        }
    }
}

impl EngineEndpoint {
    pub fn new(binary: impl Into<String>, uri: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            uri,
            env: HashMap::new(),
        }
    }
}

/// Global buildpod configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub engine: EngineEndpoint,
    pub defaults: DefaultsConfig,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Echo captured stdout of wrapped engine commands to the log sink
    pub verbose: bool,
    /// Default image for the remoting container
    pub remoting_image: Option<String>,
    /// Path to the trampoline helper binary injected into build containers
    pub trampoline_path: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            remoting_image: None,
            trampoline_path: None,
        }
    }
}

impl GlobalConfig {
    /// Load global configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load global configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.clone(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Path to the global config file
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "buildpod").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.engine.binary.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "engine.binary must not be empty".to_string(),
            ));
        }
        if let Some(uri) = &self.engine.uri {
            if uri.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "engine.uri must not be empty when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_is_local_docker() {
        let config = GlobalConfig::default();
        assert_eq!(config.engine.binary, "docker");
        assert!(config.engine.uri.is_none());
        assert!(config.engine.env.is_empty());
        assert!(!config.defaults.verbose);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(config.engine.binary, "docker");
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[engine]
binary = "podman"
uri = "tcp://10.1.2.3:2376"

[engine.env]
DOCKER_TLS_VERIFY = "1"

[defaults]
verbose = true
"#,
        )
        .unwrap();

        let config = GlobalConfig::load_from(&path).unwrap();
        assert_eq!(config.engine.binary, "podman");
        assert_eq!(config.engine.uri.as_deref(), Some("tcp://10.1.2.3:2376"));
        assert_eq!(
            config.engine.env.get("DOCKER_TLS_VERIFY").map(String::as_str),
            Some("1")
        );
        assert!(config.defaults.verbose);
    }

    #[test]
    fn test_empty_binary_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\nbinary = \"\"\n").unwrap();
        assert!(matches!(
            GlobalConfig::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "engine = not valid toml").unwrap();
        let err = GlobalConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
