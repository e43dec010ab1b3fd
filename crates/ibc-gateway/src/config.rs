//! # Gateway Configuration
//!
//! Deployment identifiers and tuning knobs for the gateway core.

use crate::domain::GatewayError;
use serde::{Deserialize, Serialize};
use std::env;

/// Hard ceiling on a denom-trace page.
pub const MAX_DENOM_TRACE_PAGE_LIMIT: usize = 1000;

/// On-chain deployment identifiers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Voucher minting policy id.
    pub mint_voucher_policy_id: String,
    /// HostState NFT unit (policy id + name).
    pub host_state_nft: String,
    /// Unit of the transfer module's custody token.
    pub transfer_module_unit: String,
    /// Channel token policy id.
    pub channel_token_policy_id: String,
}

/// Mithril header convergence settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MithrilConfig {
    /// Snapshot/proof/HostState alignment attempts before giving up.
    pub max_convergence_attempts: u32,
    /// Certificates walked before declaring the chain broken.
    pub max_certificate_chain_hops: usize,
    /// Trusting period handed to new clients, seconds.
    pub trusting_period_secs: u64,
}

impl Default for MithrilConfig {
    fn default() -> Self {
        Self {
            max_convergence_attempts: 3,
            max_certificate_chain_hops: 64,
            trusting_period_secs: 14 * 24 * 3600,
        }
    }
}

/// Gateway configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Deployment identifiers.
    pub deployment: DeploymentConfig,
    /// ICS-20 port.
    pub port_id: String,
    /// Chain id reported to counterparty clients.
    pub chain_id: String,
    /// Mithril settings.
    pub mithril: MithrilConfig,
    /// Default denom-trace page size.
    pub denom_trace_page_limit: usize,
    /// Validity window of built transactions, seconds from now.
    pub tx_time_to_live_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            deployment: DeploymentConfig::default(),
            port_id: "transfer".to_string(),
            chain_id: "cardano-devnet".to_string(),
            mithril: MithrilConfig::default(),
            denom_trace_page_limit: 100,
            tx_time_to_live_secs: 120,
        }
    }
}

impl GatewayConfig {
    /// Create a config for testing (fixed identifiers, two attempts).
    pub fn for_testing() -> Self {
        Self {
            deployment: DeploymentConfig {
                mint_voucher_policy_id: "aa".repeat(28),
                host_state_nft: format!("{}{}", "bb".repeat(28), hex::encode("handler")),
                transfer_module_unit: format!("{}{}", "cc".repeat(28), hex::encode("transfer")),
                channel_token_policy_id: "dd".repeat(28),
            },
            mithril: MithrilConfig {
                max_convergence_attempts: 2,
                max_certificate_chain_hops: 16,
                trusting_period_secs: 3600,
            },
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `GATEWAY_MINT_VOUCHER_POLICY_ID`, `GATEWAY_HOST_STATE_NFT`,
    ///   `GATEWAY_TRANSFER_MODULE_UNIT`, `GATEWAY_CHANNEL_TOKEN_POLICY_ID`
    /// - `GATEWAY_PORT_ID` (default: transfer)
    /// - `GATEWAY_CHAIN_ID` (default: cardano-devnet)
    /// - `GATEWAY_MITHRIL_MAX_ATTEMPTS` (default: 3)
    /// - `GATEWAY_MITHRIL_MAX_HOPS` (default: 64)
    /// - `GATEWAY_TRUSTING_PERIOD_SECS` (default: 14 days)
    /// - `GATEWAY_DENOM_TRACE_PAGE_LIMIT` (default: 100)
    /// - `GATEWAY_TX_TTL_SECS` (default: 120)
    pub fn from_env() -> Result<Self, GatewayError> {
        let defaults = Self::default();
        let config = Self {
            deployment: DeploymentConfig {
                mint_voucher_policy_id: env::var("GATEWAY_MINT_VOUCHER_POLICY_ID")
                    .unwrap_or_default(),
                host_state_nft: env::var("GATEWAY_HOST_STATE_NFT").unwrap_or_default(),
                transfer_module_unit: env::var("GATEWAY_TRANSFER_MODULE_UNIT").unwrap_or_default(),
                channel_token_policy_id: env::var("GATEWAY_CHANNEL_TOKEN_POLICY_ID")
                    .unwrap_or_default(),
            },
            port_id: env::var("GATEWAY_PORT_ID").unwrap_or(defaults.port_id),
            chain_id: env::var("GATEWAY_CHAIN_ID").unwrap_or(defaults.chain_id),
            mithril: MithrilConfig {
                max_convergence_attempts: parse_env(
                    "GATEWAY_MITHRIL_MAX_ATTEMPTS",
                    defaults.mithril.max_convergence_attempts,
                )?,
                max_certificate_chain_hops: parse_env(
                    "GATEWAY_MITHRIL_MAX_HOPS",
                    defaults.mithril.max_certificate_chain_hops,
                )?,
                trusting_period_secs: parse_env(
                    "GATEWAY_TRUSTING_PERIOD_SECS",
                    defaults.mithril.trusting_period_secs,
                )?,
            },
            denom_trace_page_limit: parse_env(
                "GATEWAY_DENOM_TRACE_PAGE_LIMIT",
                defaults.denom_trace_page_limit,
            )?,
            tx_time_to_live_secs: parse_env(
                "GATEWAY_TX_TTL_SECS",
                defaults.tx_time_to_live_secs,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate bounds.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.mithril.max_convergence_attempts == 0 {
            return Err(GatewayError::invalid(
                "max_convergence_attempts must be at least 1",
            ));
        }
        if self.mithril.max_certificate_chain_hops == 0 {
            return Err(GatewayError::invalid(
                "max_certificate_chain_hops must be at least 1",
            ));
        }
        if self.denom_trace_page_limit == 0
            || self.denom_trace_page_limit > MAX_DENOM_TRACE_PAGE_LIMIT
        {
            return Err(GatewayError::invalid(format!(
                "denom_trace_page_limit must be between 1 and {}",
                MAX_DENOM_TRACE_PAGE_LIMIT
            )));
        }
        if self.tx_time_to_live_secs == 0 {
            return Err(GatewayError::invalid("tx_time_to_live_secs must be at least 1"));
        }
        if self.port_id.is_empty() {
            return Err(GatewayError::invalid("port_id cannot be empty"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, GatewayError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| GatewayError::invalid(format!("{} is not a valid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs.
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `GATEWAY_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `GATEWAY_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("GATEWAY_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
            json_logs: env::var("GATEWAY_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.port_id, "transfer");
        assert_eq!(config.chain_id, "cardano-devnet");
        assert_eq!(config.mithril.max_convergence_attempts, 3);
        assert_eq!(config.denom_trace_page_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config() {
        let config = GatewayConfig::for_testing();
        assert_eq!(config.mithril.max_convergence_attempts, 2);
        assert_eq!(config.deployment.mint_voucher_policy_id.len(), 56);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = GatewayConfig::default();
        config.mithril.max_convergence_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_page_limit_over_max() {
        let mut config = GatewayConfig::default();
        config.denom_trace_page_limit = MAX_DENOM_TRACE_PAGE_LIMIT + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("denom_trace_page_limit"));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = GatewayConfig::default();
        config.tx_time_to_live_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde() {
        let config = GatewayConfig::for_testing();
        let json = serde_json::to_string(&config).unwrap();
        let back: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_default_telemetry_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
    }
}
