use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use multichain_rs::redact::redact_url;

use crate::oracle::{OracleConfig, OracleStrategy};
use crate::retry::RetryPolicy;

/// Main configuration for the relayer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub l1: L1Config,
    pub solana: SolanaConfig,
    pub confirmation: ConfirmationSettings,
    pub retry: RetrySettings,
    pub oracle: OracleSettings,
    pub settlement: SettlementSettings,
    pub api: ApiConfig,
}

/// L1 (Mars Credit) configuration
#[derive(Clone, Deserialize)]
pub struct L1Config {
    pub rpc_url: String,
    pub bridge_address: String,
    pub private_key: String,
    /// Block the bridge contract was deployed in; backfill starts here
    #[serde(default)]
    pub deploy_block: u64,
    #[serde(default = "default_l1_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
}

/// Custom Debug that redacts private_key and the RPC path/query
impl fmt::Debug for L1Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("L1Config")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("bridge_address", &self.bridge_address)
            .field("private_key", &"<redacted>")
            .field("deploy_block", &self.deploy_block)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("lookback_blocks", &self.lookback_blocks)
            .field("max_block_range", &self.max_block_range)
            .finish()
    }
}

/// Solana configuration
#[derive(Clone, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "default_solana_rpc_url")]
    pub rpc_url: String,
    pub mint_address: String,
    /// JSON byte array or base58
    pub private_key: String,
    #[serde(default = "default_solana_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_burn_scan_limit")]
    pub burn_scan_limit: usize,
}

impl fmt::Debug for SolanaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaConfig")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("mint_address", &self.mint_address)
            .field("private_key", &"<redacted>")
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("burn_scan_limit", &self.burn_scan_limit)
            .finish()
    }
}

/// Finality settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationSettings {
    #[serde(default = "default_finality_blocks")]
    pub finality_blocks: u64,
    #[serde(default = "default_confirmation_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_confirmation_timeout")]
    pub timeout_secs: u64,
}

/// Backoff parameters shared by both RPC endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_retry_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    /// Concurrent in-flight calls per endpoint
    #[serde(default = "default_rpc_concurrency")]
    pub rpc_concurrency: usize,
}

/// Idempotency check settings
#[derive(Debug, Clone, Deserialize)]
pub struct OracleSettings {
    #[serde(default = "default_strategy")]
    pub strategy: OracleStrategy,
    #[serde(default = "default_legacy_window")]
    pub legacy_window_secs: u64,
    /// Destination base units
    #[serde(default = "default_legacy_tolerance")]
    pub legacy_amount_tolerance: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_cache_revalidate")]
    pub cache_revalidate_secs: u64,
}

/// Settlement runner settings
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementSettings {
    #[serde(default = "default_settlement_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_settlement_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_resubmit_grace")]
    pub resubmit_grace_secs: u64,
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_circuit_breaker_pause")]
    pub circuit_breaker_pause_secs: u64,
    #[serde(default = "default_summary_interval")]
    pub summary_interval_secs: u64,
}

/// Status API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind_address")]
    pub bind_address: String,
}

/// Default functions
fn default_solana_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

fn default_l1_poll_interval() -> u64 {
    15_000
}

fn default_lookback_blocks() -> u64 {
    100
}

fn default_max_block_range() -> u64 {
    10_000
}

fn default_solana_poll_interval() -> u64 {
    300_000
}

fn default_burn_scan_limit() -> usize {
    100
}

fn default_finality_blocks() -> u64 {
    30
}

fn default_confirmation_poll_interval() -> u64 {
    60_000
}

fn default_confirmation_timeout() -> u64 {
    20 * 60
}

fn default_retry_base_delay() -> u64 {
    3000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retry_max_delay() -> u64 {
    30_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_rpc_concurrency() -> usize {
    4
}

fn default_strategy() -> OracleStrategy {
    OracleStrategy::MemoWithLegacyAmount
}

fn default_legacy_window() -> u64 {
    90 * 24 * 60 * 60
}

fn default_legacy_tolerance() -> u64 {
    // 0.001 token at 9 decimals
    1_000_000
}

fn default_cache_max_entries() -> usize {
    50_000
}

fn default_cache_revalidate() -> u64 {
    30 * 60
}

fn default_settlement_interval() -> u64 {
    5000
}

fn default_settlement_concurrency() -> usize {
    4
}

fn default_resubmit_grace() -> u64 {
    120
}

fn default_circuit_breaker_threshold() -> u32 {
    10
}

fn default_circuit_breaker_pause() -> u64 {
    60
}

fn default_summary_interval() -> u64 {
    60
}

fn default_api_bind_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| eyre!("{} environment variable is required", key))
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    fn load_from_env() -> Result<Self> {
        let l1 = L1Config {
            rpc_url: required("L1_RPC_URL")?,
            bridge_address: required("BRIDGE_CONTRACT_ADDRESS")?,
            private_key: required("RELAYER_PRIVATE_KEY")?,
            deploy_block: env::var("L1_BRIDGE_DEPLOY_BLOCK")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .wrap_err("L1_BRIDGE_DEPLOY_BLOCK must be a valid u64")?
                .unwrap_or_default(),
            poll_interval_ms: env::var("L1_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_l1_poll_interval()),
            lookback_blocks: env::var("L1_LOOKBACK_BLOCKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_lookback_blocks()),
            max_block_range: env::var("L1_MAX_BLOCK_RANGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_max_block_range()),
        };

        let solana = SolanaConfig {
            rpc_url: env::var("SOLANA_RPC_URL").unwrap_or_else(|_| default_solana_rpc_url()),
            mint_address: required("MARS_MINT_ADDRESS")?,
            private_key: required("SOLANA_PRIVATE_KEY")?,
            poll_interval_ms: env::var("SOLANA_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_solana_poll_interval()),
            burn_scan_limit: env::var("SOLANA_BURN_SCAN_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_burn_scan_limit()),
        };

        let confirmation = ConfirmationSettings {
            finality_blocks: env::var("FINALITY_BLOCKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_finality_blocks()),
            poll_interval_ms: env::var("CONFIRMATION_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_confirmation_poll_interval()),
            timeout_secs: env::var("CONFIRMATION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_confirmation_timeout()),
        };

        let retry = RetrySettings {
            base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_retry_base_delay()),
            backoff_multiplier: env::var("RETRY_BACKOFF_MULTIPLIER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_backoff_multiplier()),
            max_delay_ms: env::var("RETRY_MAX_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_retry_max_delay()),
            max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_retry_max_attempts()),
            rpc_concurrency: env::var("RPC_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_rpc_concurrency()),
        };

        let oracle = OracleSettings {
            strategy: match env::var("IDEMPOTENCY_STRATEGY") {
                Ok(raw) => raw.parse().map_err(|e: String| eyre!(e))?,
                Err(_) => default_strategy(),
            },
            legacy_window_secs: env::var("LEGACY_MATCH_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_legacy_window()),
            legacy_amount_tolerance: env::var("LEGACY_AMOUNT_TOLERANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_legacy_tolerance()),
            cache_max_entries: env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_cache_max_entries()),
            cache_revalidate_secs: env::var("CACHE_REVALIDATE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_cache_revalidate()),
        };

        let settlement = SettlementSettings {
            interval_ms: env::var("SETTLEMENT_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_settlement_interval()),
            concurrency: env::var("SETTLEMENT_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_settlement_concurrency()),
            resubmit_grace_secs: env::var("RESUBMIT_GRACE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_resubmit_grace()),
            circuit_breaker_threshold: env::var("CIRCUIT_BREAKER_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_circuit_breaker_threshold()),
            circuit_breaker_pause_secs: env::var("CIRCUIT_BREAKER_PAUSE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_circuit_breaker_pause()),
            summary_interval_secs: env::var("SUMMARY_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_summary_interval()),
        };

        let api = ApiConfig {
            bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| default_api_bind_address()),
        };

        let config = Config {
            l1,
            solana,
            confirmation,
            retry,
            oracle,
            settlement,
            api,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.l1.rpc_url.is_empty() {
            return Err(eyre!("L1_RPC_URL cannot be empty"));
        }

        if self.l1.bridge_address.len() != 42 || !self.l1.bridge_address.starts_with("0x") {
            return Err(eyre!(
                "BRIDGE_CONTRACT_ADDRESS must be a valid hex address (42 chars with 0x prefix)"
            ));
        }

        let key = self
            .l1
            .private_key
            .strip_prefix("0x")
            .unwrap_or(&self.l1.private_key);
        if key.len() != 64 || hex::decode(key).is_err() {
            return Err(eyre!("RELAYER_PRIVATE_KEY must be 64 hex chars (optionally 0x-prefixed)"));
        }

        if self.solana.rpc_url.is_empty() {
            return Err(eyre!("SOLANA_RPC_URL cannot be empty"));
        }

        if self.solana.mint_address.is_empty() {
            return Err(eyre!("MARS_MINT_ADDRESS cannot be empty"));
        }

        if self.solana.private_key.trim().is_empty() {
            return Err(eyre!("SOLANA_PRIVATE_KEY cannot be empty"));
        }

        if self.l1.max_block_range == 0 {
            return Err(eyre!("L1_MAX_BLOCK_RANGE must be at least 1"));
        }

        if self.confirmation.finality_blocks == 0 {
            return Err(eyre!("FINALITY_BLOCKS must be at least 1"));
        }

        if self.retry.max_attempts == 0 {
            return Err(eyre!("RETRY_MAX_ATTEMPTS must be at least 1"));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(eyre!("RETRY_BACKOFF_MULTIPLIER must be >= 1.0"));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(eyre!("RETRY_MAX_DELAY_MS must be >= RETRY_BASE_DELAY_MS"));
        }

        if self.retry.rpc_concurrency == 0 || self.settlement.concurrency == 0 {
            return Err(eyre!("RPC_CONCURRENCY and SETTLEMENT_CONCURRENCY must be at least 1"));
        }

        if self.oracle.cache_max_entries == 0 {
            return Err(eyre!("CACHE_MAX_ENTRIES must be at least 1"));
        }

        self.api
            .bind_address
            .parse::<std::net::SocketAddr>()
            .wrap_err("API_BIND_ADDRESS must be host:port")?;

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            multiplier: self.retry.backoff_multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            max_attempts: self.retry.max_attempts,
        }
    }

    pub fn oracle_config(&self) -> OracleConfig {
        OracleConfig {
            strategy: self.oracle.strategy,
            legacy_window: Duration::from_secs(self.oracle.legacy_window_secs),
            amount_tolerance: self.oracle.legacy_amount_tolerance,
            cache_max_entries: self.oracle.cache_max_entries,
            revalidate_after: Duration::from_secs(self.oracle.cache_revalidate_secs),
            ..OracleConfig::default()
        }
    }
}
