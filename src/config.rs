//! Hyperparameter file and service settings.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;

/// Name of the hyperparameter file at the project root.
pub const PARAMS_FILE_NAME: &str = "params.toml";
/// Environment variable overriding the server listen address.
pub const ADDR_ENV: &str = "IRISML_ADDR";
/// Environment variable enabling multi-process metrics aggregation.
pub const MULTIPROC_DIR_ENV: &str = "PROMETHEUS_MULTIPROC_DIR";
/// Listen address used when `IRISML_ADDR` is not set.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8000";

/// Errors that may occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the hyperparameter file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse the TOML document.
    #[error("Invalid params at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// A parsed value is outside its allowed range.
    #[error("Invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// Offending key.
        key: &'static str,
        /// Human-readable constraint.
        reason: String,
    },
    /// The listen address could not be parsed.
    #[error("Invalid listen address `{value}` in {ADDR_ENV}: {source}")]
    InvalidAddr {
        /// Raw environment value.
        value: String,
        /// Parse error.
        source: std::net::AddrParseError,
    },
    /// Project directories could not be resolved.
    #[error(transparent)]
    Dirs(#[from] app_dirs::AppDirError),
}

/// Hyperparameters for one training run. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Number of trees in the forest.
    pub n_estimators: usize,
    /// Maximum depth of each tree.
    pub max_depth: usize,
    /// Fraction of rows placed in the training split.
    pub train_size: f64,
    /// Seed for the split and the forest.
    pub random_state: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 4,
            train_size: 0.8,
            random_state: 42,
        }
    }
}

impl Params {
    /// Path of `params.toml` under the project root.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(app_dirs::project_root()?.join(PARAMS_FILE_NAME))
    }

    /// Load and validate hyperparameters from a TOML file.
    ///
    /// The file itself must exist; keys absent from it take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|err| match err {
            ConfigError::ParseToml { source, .. } => ConfigError::ParseToml {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate hyperparameters from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let params: Self = toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: PathBuf::from(PARAMS_FILE_NAME),
            source,
        })?;
        params.validate()?;
        Ok(params)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_estimators == 0 {
            return Err(ConfigError::InvalidValue {
                key: "n_estimators",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.train_size > 0.0 && self.train_size < 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "train_size",
                reason: format!("must be in (0, 1), got {}", self.train_size),
            });
        }
        Ok(())
    }
}

/// Settings for the prediction server, read from the environment.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Socket address to listen on.
    pub addr: SocketAddr,
    /// Location of the model artifact.
    pub model_path: PathBuf,
    /// Shared directory for multi-process metrics, when enabled.
    pub multiproc_dir: Option<PathBuf>,
}

impl ServeConfig {
    /// Build the server settings from `IRISML_ADDR`, `IRISML_HOME` and
    /// `PROMETHEUS_MULTIPROC_DIR`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = match std::env::var(ADDR_ENV) {
            Ok(value) if !value.trim().is_empty() => parse_addr(&value)?,
            _ => parse_addr(DEFAULT_ADDR)?,
        };
        let model_path = crate::artifacts::ArtifactStore::from_project_root()?.model_path();
        let multiproc_dir = std::env::var_os(MULTIPROC_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Ok(Self {
            addr,
            model_path,
            multiproc_dir,
        })
    }
}

fn parse_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidAddr {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_keys_take_defaults() {
        let params = Params::from_toml_str("n_estimators = 10\n").unwrap();
        assert_eq!(params.n_estimators, 10);
        assert_eq!(params.max_depth, 4);
        assert_eq!(params.train_size, 0.8);
        assert_eq!(params.random_state, 42);
    }

    #[test]
    fn empty_document_is_all_defaults() {
        assert_eq!(Params::from_toml_str("").unwrap(), Params::default());
    }

    #[test]
    fn rejects_out_of_range_train_size() {
        let err = Params::from_toml_str("train_size = 1.5").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "train_size",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_estimators() {
        let err = Params::from_toml_str("n_estimators = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "n_estimators",
                ..
            }
        ));
    }

    #[test]
    fn load_reports_path_for_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(PARAMS_FILE_NAME);
        let err = Params::load(&path).unwrap_err();
        match err {
            ConfigError::Read { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_reports_path_for_bad_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(PARAMS_FILE_NAME);
        std::fs::write(&path, "n_estimators = \"many\"").unwrap();
        let err = Params::load(&path).unwrap_err();
        match err {
            ConfigError::ParseToml { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parses_listen_address() {
        let addr = parse_addr(" 0.0.0.0:9000 ").unwrap();
        assert_eq!(addr.port(), 9000);
        assert!(parse_addr("not-an-addr").is_err());
    }
}
