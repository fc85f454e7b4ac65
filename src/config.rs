//! Configuration module for holderscan

use std::{env, fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::chains::Chain;
use crate::error::ScanError;

/// Application configuration loaded from a YAML file, with environment
/// overrides for secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Covalent API key
    #[serde(rename = "apiKey", default)]
    pub api_key: String,

    /// Chains to scan holder portfolios on
    pub chains: Vec<String>,

    /// Directory for per-chain token reports
    #[serde(rename = "tokensDir", default = "default_tokens_dir")]
    pub tokens_dir: String,

    /// Directory for the whale report
    #[serde(rename = "whalesDir", default = "default_whales_dir")]
    pub whales_dir: String,

    /// Fixed interval between upstream requests, in milliseconds
    #[serde(rename = "requestIntervalMs", default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
}

fn default_tokens_dir() -> String {
    "results/tokens".to_string()
}

fn default_whales_dir() -> String {
    "results/whales".to_string()
}

fn default_request_interval_ms() -> u64 {
    25
}

impl Config {
    /// Load configuration. `COVALENT_API_KEY` in the environment (or a .env
    /// file) takes precedence over the key in the config file.
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();

        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        if let Ok(key) = env::var("COVALENT_API_KEY") {
            config.api_key = key;
        }
        if config.api_key.is_empty() {
            bail!("no Covalent API key in config file or COVALENT_API_KEY");
        }
        if config.chains.is_empty() {
            bail!("no chains configured");
        }

        Ok(config)
    }

    /// The configured chain list, parsed. Any unknown name aborts the run.
    pub fn scan_chains(&self) -> Result<Vec<Chain>, ScanError> {
        self.chains.iter().map(|c| c.parse()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_with_defaults() {
        let config: Config = serde_yaml::from_str(
            "apiKey: ckey_test\nchains:\n  - ETHEREUM\n  - MATIC\n",
        )
        .unwrap();

        assert_eq!(config.api_key, "ckey_test");
        assert_eq!(config.chains, vec!["ETHEREUM", "MATIC"]);
        assert_eq!(config.tokens_dir, "results/tokens");
        assert_eq!(config.whales_dir, "results/whales");
        assert_eq!(config.request_interval_ms, 25);
    }

    #[test]
    fn chain_list_parses_into_chains() {
        let config: Config = serde_yaml::from_str(
            "apiKey: k\nchains: [ethereum, fantom]\n",
        )
        .unwrap();
        let chains = config.scan_chains().unwrap();
        assert_eq!(chains, vec![Chain::Ethereum, Chain::Fantom]);
    }

    #[test]
    fn unknown_chain_in_config_is_rejected() {
        let config: Config = serde_yaml::from_str(
            "apiKey: k\nchains: [ethereum, near]\n",
        )
        .unwrap();
        assert!(config.scan_chains().is_err());
    }
}
