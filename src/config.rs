/// Store configuration.
///
/// Settings come from an optional TOML file and can be overridden by
/// environment variables (a `.env` file in the working directory is loaded
/// first):
///
/// ```toml
/// store_root = "/data/hucstore"
/// log_level = "info"
/// log_file = "/var/log/hucstore.log"
/// console_timestamps = true
///
/// [nwis]
/// base_url = "https://waterservices.usgs.gov/nwis"
/// timeout_secs = 60
/// period = "P7D"
/// ```
///
/// | variable             | overrides        |
/// |----------------------|------------------|
/// | `HUCSTORE_CONFIG`    | config file path |
/// | `HUCSTORE_ROOT`      | `store_root`     |
/// | `HUCSTORE_LOG_LEVEL` | `log_level`      |

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::logging::{self, LogLevel};

pub const ENV_CONFIG_PATH: &str = "HUCSTORE_CONFIG";
pub const ENV_STORE_ROOT: &str = "HUCSTORE_ROOT";
pub const ENV_LOG_LEVEL: &str = "HUCSTORE_LOG_LEVEL";

pub const DEFAULT_NWIS_BASE_URL: &str = "https://waterservices.usgs.gov/nwis";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub store_root: PathBuf,
    pub log_level: String,
    pub log_file: Option<String>,
    pub console_timestamps: bool,
    pub nwis: NwisConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            store_root: PathBuf::from("hucstore_data"),
            log_level: "info".to_string(),
            log_file: None,
            console_timestamps: false,
            nwis: NwisConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NwisConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// ISO 8601 duration of history requested per fetch, e.g. "P7D".
    pub period: String,
}

impl Default for NwisConfig {
    fn default() -> Self {
        NwisConfig {
            base_url: DEFAULT_NWIS_BASE_URL.to_string(),
            timeout_secs: 60,
            period: "P7D".to_string(),
        }
    }
}

impl StoreConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads `.env`, then the file named by `HUCSTORE_CONFIG` (if set), then
    /// applies the remaining environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_PATH) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => StoreConfig::default(),
        };

        if let Some(root) = lookup(ENV_STORE_ROOT) {
            config.store_root = PathBuf::from(root);
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        self.log_level.parse().map_err(|message| ConfigError::Invalid {
            key: "log_level".to_string(),
            message,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "store_root".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.nwis.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "nwis.timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        self.log_level()?;
        Ok(())
    }

    /// Installs the global logger with these settings.
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        logging::init_logger(self.log_level()?, self.log_file.as_deref(), self.console_timestamps);
        Ok(())
    }
}
