//! TOML configuration loading and validation.

use std::path::Path;

use detf::{BPS_SCALE, SlippageTolerance};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub prices: PricesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_slippage")]
    pub slippage_bps: u32,
    /// Upper bound on legs in one atomic submission.
    #[serde(default = "default_max_legs")]
    pub max_legs_per_batch: usize,
    /// Reject target allocations that do not sum to exactly 100%.
    #[serde(default = "default_true")]
    pub strict_weights: bool,
}

fn default_slippage() -> u32 {
    50
}
fn default_max_legs() -> usize {
    64
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_max_vaults")]
    pub max_concurrent_vaults: usize,
    #[serde(default = "default_true")]
    pub parallel_quotes: bool,
}

fn default_max_vaults() -> usize {
    4
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_concurrent_vaults: default_max_vaults(),
            parallel_quotes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourceKind {
    /// Prices from the paper-vault state file.
    Paper,
    CoinGecko,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricesConfig {
    #[serde(default = "default_source")]
    pub source: PriceSourceKind,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Override the API root, e.g. the pro endpoint or a caching proxy.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_source() -> PriceSourceKind {
    PriceSourceKind::Paper
}
fn default_platform() -> String {
    "binance-smart-chain".into()
}
fn default_vs_currency() -> String {
    "bnb".into()
}
fn default_timeout() -> u64 {
    10
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            platform: default_platform(),
            vs_currency: default_vs_currency(),
            timeout_secs: default_timeout(),
            api_key: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.execution.slippage_bps > BPS_SCALE {
            return Err(Error::Config(format!(
                "slippage_bps must be <= {BPS_SCALE}"
            )));
        }
        if self.execution.max_legs_per_batch == 0 {
            return Err(Error::Config("max_legs_per_batch must be > 0".into()));
        }
        if self.workers.max_concurrent_vaults == 0 {
            return Err(Error::Config("max_concurrent_vaults must be > 0".into()));
        }
        if self.prices.source == PriceSourceKind::CoinGecko {
            if self.prices.platform.is_empty() || self.prices.vs_currency.is_empty() {
                return Err(Error::Config(
                    "coingecko source needs platform and vs_currency".into(),
                ));
            }
            if self.prices.timeout_secs == 0 {
                return Err(Error::Config("timeout_secs must be > 0".into()));
            }
        }
        Ok(())
    }

    pub fn slippage(&self) -> Result<SlippageTolerance> {
        SlippageTolerance::from_bps(self.execution.slippage_bps)
            .ok_or_else(|| Error::Config("slippage_bps out of range".into()))
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> std::path::PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}
