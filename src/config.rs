//! Configuration file support for the distribution engine.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file)
//! is a valid configuration.

use crate::types::Amount;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_MAX_RECIPIENTS: usize = 100_000;
const DEFAULT_MAX_AMOUNT_PER_RECIPIENT: Amount = Amount::MAX;
const DEFAULT_DURATION_DAYS: u64 = 30;
const DEFAULT_MAX_DURATION_DAYS: u64 = 365;
const DEFAULT_PAGE_SIZE: usize = 20;
const DEFAULT_MAX_PAGE_SIZE: usize = 100;
const DEFAULT_MAX_INPUT_FILE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_CHAIN_CACHE_TTL_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Upper bound on leaves; proof length grows with `ceil(log2(n))`.
    #[serde(default = "default_max_recipients")]
    pub max_recipients: usize,
    #[serde(
        default = "default_max_amount_per_recipient",
        with = "crate::types::serde_amount"
    )]
    pub max_amount_per_recipient: Amount,
    #[serde(default)]
    pub allow_zero_address: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    #[serde(default = "default_duration_days")]
    pub default_duration_days: u64,
    #[serde(default = "default_max_duration_days")]
    pub max_duration_days: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_max_input_file_size")]
    pub max_file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Lifetime of cached root and timing reads. Claim flags are never cached.
    #[serde(default = "default_chain_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_recipients: DEFAULT_MAX_RECIPIENTS,
            max_amount_per_recipient: DEFAULT_MAX_AMOUNT_PER_RECIPIENT,
            allow_zero_address: false,
        }
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            default_duration_days: DEFAULT_DURATION_DAYS,
            max_duration_days: DEFAULT_MAX_DURATION_DAYS,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_INPUT_FILE_SIZE,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CHAIN_CACHE_TTL_SECS,
        }
    }
}

fn default_max_recipients() -> usize {
    DEFAULT_MAX_RECIPIENTS
}

fn default_max_amount_per_recipient() -> Amount {
    DEFAULT_MAX_AMOUNT_PER_RECIPIENT
}

fn default_duration_days() -> u64 {
    DEFAULT_DURATION_DAYS
}

fn default_max_duration_days() -> u64 {
    DEFAULT_MAX_DURATION_DAYS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_max_input_file_size() -> u64 {
    DEFAULT_MAX_INPUT_FILE_SIZE
}

fn default_chain_cache_ttl_secs() -> u64 {
    DEFAULT_CHAIN_CACHE_TTL_SECS
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn load_from_file_or_default(path: &Path) -> Self {
        Self::load_from_file(path).unwrap_or_default()
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.validation.max_recipients, DEFAULT_MAX_RECIPIENTS);
        assert_eq!(config.validation.max_amount_per_recipient, Amount::MAX);
        assert!(!config.validation.allow_zero_address);
        assert_eq!(config.distribution.default_duration_days, DEFAULT_DURATION_DAYS);
        assert_eq!(config.chain.cache_ttl_secs, DEFAULT_CHAIN_CACHE_TTL_SECS);
    }

    #[test]
    fn test_serialize_deserialize_config() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.validation, deserialized.validation);
        assert_eq!(config.distribution, deserialized.distribution);
    }

    #[test]
    fn test_custom_config() {
        let config_toml = r#"
            [validation]
            max_recipients = 500
            max_amount_per_recipient = "1000000000000000000000"

            [distribution]
            default_duration_days = 7

            [chain]
            cache_ttl_secs = 5
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.validation.max_recipients, 500);
        assert_eq!(
            config.validation.max_amount_per_recipient,
            1_000_000_000_000_000_000_000
        );
        assert_eq!(config.distribution.default_duration_days, 7);
        assert_eq!(config.distribution.max_duration_days, DEFAULT_MAX_DURATION_DAYS);
        assert_eq!(config.chain.cache_ttl_secs, 5);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("distributor.toml");

        let mut config = Config::default();
        config.validation.max_recipients = 42;
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.validation.max_recipients, 42);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = Config::load_from_file_or_default(Path::new("/nonexistent/distributor.toml"));
        assert_eq!(config.validation.max_recipients, DEFAULT_MAX_RECIPIENTS);
    }
}
