use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::LedgerNetwork;
use crate::swap::{PaymentChain, PaymentToken};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    /// PostgreSQL connection URL; the in-memory store is used when unset
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub verification: VerificationWorkerConfig,
    #[serde(default)]
    pub transfer: TransferWorkerConfig,
    pub ledger: LedgerConfig,
    /// Source chains accepted for deposits
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    pub stuck_sweep_interval_secs: u64,
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,
}

fn default_monitor_interval() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            stuck_sweep_interval_secs: 300,
            monitor_interval_secs: default_monitor_interval(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn stuck_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stuck_sweep_interval_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerificationWorkerConfig {
    pub max_retries: i64,
    pub retry_delay_secs: i64,
    pub batch_size: usize,
    pub retry_batch_size: usize,
    /// Upper bound for one verification call
    pub call_timeout_secs: u64,
}

impl Default for VerificationWorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 30,
            batch_size: 50,
            retry_batch_size: 20,
            call_timeout_secs: 30,
        }
    }
}

impl VerificationWorkerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferWorkerConfig {
    pub max_retries: i64,
    pub retry_delay_secs: i64,
    pub batch_size: usize,
    pub retry_batch_size: usize,
    /// Age of a claimed transfer after which the sweep takes it over
    pub stuck_threshold_secs: u64,
    pub stuck_batch_size: usize,
    pub bulk_batch_size: usize,
    pub call_timeout_secs: u64,
}

impl Default for TransferWorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 60,
            batch_size: 30,
            retry_batch_size: 15,
            stuck_threshold_secs: 600,
            stuck_batch_size: 10,
            bulk_batch_size: 10,
            call_timeout_secs: 30,
        }
    }
}

impl TransferWorkerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_threshold_secs)
    }
}

/// Alert thresholds for the pipeline monitor
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Minutes a record may sit in `payment_verified` before it is reported stuck
    pub stuck_payment_verified_mins: i64,
    /// Transfer failure rate over the last hour that raises an alert
    pub failed_transfer_percent: Decimal,
    /// Wallet configuration failures within the window that raise an alert
    pub wallet_config_failure_count: u64,
    pub wallet_failure_window_mins: i64,
    /// Most swap ids listed in one alert
    pub max_listed_ids: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stuck_payment_verified_mins: 30,
            failed_transfer_percent: Decimal::from(25),
            wallet_config_failure_count: 3,
            wallet_failure_window_mins: 15,
            max_listed_ids: 50,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    pub network: LedgerNetwork,
    /// Overrides the network's default NAG endpoint
    #[serde(default)]
    pub gateway_url: Option<String>,
    /// Overrides the network's blockchain id
    #[serde(default)]
    pub blockchain_id: Option<String>,
    #[serde(default = "default_ledger_timeout")]
    pub timeout_secs: u64,
    /// Environment variable holding the settlement wallet seed phrase
    #[serde(default = "default_seed_env")]
    pub seed_phrase_env: String,
    /// Environment variable holding the raw private key (takes precedence)
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

fn default_ledger_timeout() -> u64 {
    30
}

fn default_seed_env() -> String {
    "CIRX_WALLET_SEED_PHRASE".to_string()
}

fn default_private_key_env() -> String {
    "CIRX_WALLET_PRIVATE_KEY".to_string()
}

impl LedgerConfig {
    pub fn gateway_url(&self) -> &str {
        self.gateway_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_gateway_url())
    }

    pub fn blockchain_id(&self) -> &str {
        self.blockchain_id
            .as_deref()
            .unwrap_or_else(|| self.network.blockchain_id())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChainConfig {
    pub chain: PaymentChain,
    pub rpc_url: String,
    /// Address deposits must be sent to
    pub project_wallet: String,
    #[serde(default)]
    pub required_confirmations: Option<u64>,
    /// ERC-20 contract per token; the chain's native coin needs no entry
    #[serde(default)]
    pub token_contracts: HashMap<PaymentToken, String>,
}

impl ChainConfig {
    pub fn confirmations(&self) -> u64 {
        self.required_confirmations.unwrap_or(match self.chain {
            PaymentChain::Ethereum => 12,
            PaymentChain::Polygon => 128,
            PaymentChain::BinanceSmartChain => 15,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiscountTier {
    pub min_usd: Decimal,
    pub percent: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PricingConfig {
    pub cirx_usd_price: Decimal,
    pub token_usd_prices: HashMap<PaymentToken, Decimal>,
    pub discount_tiers: Vec<DiscountTier>,
    /// Decimal places of the CIRX amount sent
    pub settlement_scale: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let token_usd_prices = HashMap::from([
            (PaymentToken::Eth, Decimal::from(2700)),
            (PaymentToken::Usdc, Decimal::ONE),
            (PaymentToken::Usdt, Decimal::ONE),
            (PaymentToken::Bnb, Decimal::from(600)),
            (PaymentToken::Matic, Decimal::new(5, 1)),
        ]);
        let tier = |min_usd: i64, percent: i64| DiscountTier {
            min_usd: Decimal::from(min_usd),
            percent: Decimal::from(percent),
        };
        Self {
            cirx_usd_price: Decimal::new(250, 2),
            token_usd_prices,
            discount_tiers: vec![tier(50_000, 12), tier(10_000, 8), tier(1_000, 5)],
            settlement_scale: 6,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().display().to_string();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            other => other,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(format!("config/{}.yaml", env))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pricing.cirx_usd_price <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "pricing.cirx_usd_price must be positive".to_string(),
            ));
        }
        if self.monitor.failed_transfer_percent <= Decimal::ZERO
            || self.monitor.failed_transfer_percent > Decimal::ONE_HUNDRED
        {
            return Err(ConfigError::Invalid(
                "monitor.failed_transfer_percent must be in (0, 100]".to_string(),
            ));
        }
        if self.verification.batch_size == 0 || self.transfer.batch_size == 0 {
            return Err(ConfigError::Invalid("batch sizes must be non-zero".to_string()));
        }
        let longest_call = self
            .transfer
            .call_timeout_secs
            .max(self.ledger.timeout_secs);
        if self.transfer.stuck_threshold_secs <= longest_call {
            return Err(ConfigError::Invalid(format!(
                "transfer.stuck_threshold_secs ({}) must exceed the longest transfer call ({}s)",
                self.transfer.stuck_threshold_secs, longest_call
            )));
        }
        for chain in &self.chains {
            if chain.project_wallet.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "chains.{}: project_wallet is required",
                    chain.chain
                )));
            }
        }
        Ok(())
    }

    pub fn chain(&self, chain: PaymentChain) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain == chain)
    }
}
