//! Engine configuration, read once from the environment at startup.
//!
//! The configuration is process-scoped: the engine receives an immutable
//! [`EngineConfig`] at construction and never re-reads the environment
//! mid-run.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Process-wide engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory scanned for module manifests at startup
    pub modules_dir: PathBuf,

    /// Base path handed to delegated workflows for repository scratch space
    pub repos_base_path: PathBuf,

    /// When true, a `${path}` placeholder that misses the context is a
    /// template error instead of substituting empty/null
    pub strict_templating: bool,

    /// Environment variable names exported into the context under `env`
    pub env_export: Vec<String>,

    /// HTTP server settings
    pub server: ServerConfig,
}

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("modules"),
            repos_base_path: env::temp_dir().join("cascade-repos"),
            strict_templating: false,
            env_export: Vec::new(),
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            modules_dir: env::var("CASCADE_MODULES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.modules_dir),
            repos_base_path: env::var("CASCADE_REPOS_BASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.repos_base_path),
            strict_templating: env::var("CASCADE_STRICT_TEMPLATING")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            env_export: env::var("CASCADE_ENV_EXPORT")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.server.host),
                port: env::var("PORT")
                    .unwrap_or_else(|_| defaults.server.port.to_string())
                    .parse()
                    .map_err(|e| EngineError::Configuration {
                        message: format!("PORT: {}", e),
                    })?,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(EngineError::Configuration {
                message: "PORT must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        env::set_var("CASCADE_MODULES_DIR", "/opt/cascade/modules");
        env::set_var("CASCADE_ENV_EXPORT", "DEPLOY_ENV, REGION");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.modules_dir, PathBuf::from("/opt/cascade/modules"));
        assert_eq!(config.env_export, vec!["DEPLOY_ENV", "REGION"]);
        env::remove_var("CASCADE_MODULES_DIR");
        env::remove_var("CASCADE_ENV_EXPORT");
    }

    #[test]
    #[serial]
    fn invalid_port_is_a_configuration_error() {
        env::set_var("PORT", "not-a-port");
        let err = EngineConfig::from_env().unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
        env::remove_var("PORT");
    }
}
