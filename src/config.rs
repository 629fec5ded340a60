//! Configuration management for hybridcrypt

use crate::crypto::DEFAULT_KEY_BITS;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default package file extension
pub const DEFAULT_PACKAGE_EXTENSION: &str = "epkg";

/// Smallest accepted RSA key size
pub const MIN_KEY_BITS: usize = 1024;

/// Largest RSA key size the PEM decoder accepts
pub const MAX_KEY_BITS: usize = 4096;

/// Key generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// RSA modulus size in bits for new keys
    pub bits: usize,

    /// Directory new key files are written to when given a bare file name
    pub directory: PathBuf,
}

/// Package configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// File extension for written packages (without the dot)
    pub extension: String,

    /// Wrap keys for all recipients concurrently
    pub parallel_wrap: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Key generation configuration
    pub keys: KeyConfig,

    /// Package configuration
    pub package: PackageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for KeyConfig {
    fn default() -> Self {
        KeyConfig {
            bits: DEFAULT_KEY_BITS,
            directory: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("hybridcrypt")
                .join("keys"),
        }
    }
}

impl Default for PackageConfig {
    fn default() -> Self {
        PackageConfig {
            extension: DEFAULT_PACKAGE_EXTENSION.to_string(),
            parallel_wrap: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or JSON), with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let content = Self::substitute_env_vars(&content);

        let mut config: Config = if is_yaml(path_ref) {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse YAML config: {}", e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse JSON config: {}", e))
            })?
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path` if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bits) = std::env::var("HYBRIDCRYPT_KEY_BITS") {
            if let Ok(bits) = bits.trim().parse::<usize>() {
                self.keys.bits = bits;
            }
        }

        if let Ok(level) = std::env::var("HYBRIDCRYPT_LOG_LEVEL") {
            let level = level.trim().to_string();
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Substitute environment variables in config content
    /// Supports ${VAR_NAME} syntax
    fn substitute_env_vars(content: &str) -> String {
        let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid regex");

        re.replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
    }

    /// Save configuration to a file (format determined by extension)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        let content = if is_yaml(path_ref) {
            serde_yaml::to_string(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to YAML: {}", e))
            })?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to JSON: {}", e))
            })?
        };

        std::fs::write(path_ref, content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.keys.bits < MIN_KEY_BITS || self.keys.bits > MAX_KEY_BITS {
            return Err(Error::InvalidConfig(format!(
                "Key size must be between {} and {} bits, got {}",
                MIN_KEY_BITS, MAX_KEY_BITS, self.keys.bits
            )));
        }

        if self.keys.bits % 8 != 0 {
            return Err(Error::InvalidConfig(format!(
                "Key size must be a multiple of 8 bits, got {}",
                self.keys.bits
            )));
        }

        let extension = self.package.extension.trim_start_matches('.');
        if extension.is_empty() || extension.contains(|c: char| c == '/' || c == '\\') {
            return Err(Error::InvalidConfig(format!(
                "Invalid package extension {:?}",
                self.package.extension
            )));
        }

        Ok(())
    }

    /// Package file extension without a leading dot
    pub fn package_extension(&self) -> &str {
        self.package.extension.trim_start_matches('.')
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}
