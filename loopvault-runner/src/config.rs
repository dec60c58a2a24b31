//! Serializable protocol configuration.
//!
//! One TOML file carries everything needed to stand up an engine against the
//! simulated collaborators: policy parameters, position lifetime, protocol
//! account names, swap tolerance, and the initial market depth.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use loopvault_core::domain::{AccountId, Amount, Bps};
use loopvault_core::engine::{EngineAccounts, EngineConfig};
use loopvault_core::ledger::MAX_TIME_TO_LIVE_DAYS;
use loopvault_core::policy::{PolicyError, PolicyParams};

/// Account holding the simulated pool's reserves.
pub const POOL_ACCOUNT: &str = "pool";
/// Account holding the simulated vault's assets.
pub const VAULT_ACCOUNT: &str = "vault";
/// Sink for principal written off by simulated vault losses.
pub const LOSS_ACCOUNT: &str = "loss";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid protocol TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize protocol config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level protocol configuration. Every section is optional in the file
/// and falls back to the deployment defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub policy: PolicySection,
    pub positions: PositionsSection,
    pub accounts: AccountsSection,
    pub swap: SwapSection,
    pub market: MarketSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub cycle_rate_bps: u16,
    pub max_cycles: u32,
    pub collateral_per_leverage: Amount,
    pub origination_fee_bps: u16,
    pub rebase_fee_bps: u16,
}

impl Default for PolicySection {
    fn default() -> Self {
        let params = PolicyParams::default();
        Self {
            cycle_rate_bps: params.cycle_rate.0,
            max_cycles: params.max_cycles,
            collateral_per_leverage: params.collateral_per_leverage,
            origination_fee_bps: params.origination_fee.0,
            rebase_fee_bps: params.rebase_fee.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionsSection {
    pub time_to_live_days: u32,
}

impl Default for PositionsSection {
    fn default() -> Self {
        Self {
            time_to_live_days: EngineConfig::default().time_to_live_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsSection {
    pub treasury: String,
    pub reserve: String,
    pub custody: String,
    pub governance: String,
    pub liquidator: String,
}

impl Default for AccountsSection {
    fn default() -> Self {
        let accounts = EngineAccounts::default();
        Self {
            treasury: accounts.treasury.0,
            reserve: accounts.reserve.0,
            custody: accounts.custody.0,
            governance: "governance".into(),
            liquidator: accounts.liquidator.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapSection {
    pub max_slippage_bps: u16,
}

impl Default for SwapSection {
    fn default() -> Self {
        Self {
            max_slippage_bps: EngineConfig::default().max_slippage.0,
        }
    }
}

/// Initial state of the simulated collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSection {
    pub pool_debt_reserve: Amount,
    pub pool_principal_reserve: Amount,
    pub pool_fee_bps: u16,
    pub reserve_debt: Amount,
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            pool_debt_reserve: Amount::from_units(1_000_000),
            pool_principal_reserve: Amount::from_units(1_000_000),
            pool_fee_bps: 4,
            reserve_debt: Amount::from_units(1_000_000),
        }
    }
}

impl ProtocolConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn policy_params(&self) -> PolicyParams {
        PolicyParams {
            cycle_rate: Bps(self.policy.cycle_rate_bps),
            max_cycles: self.policy.max_cycles,
            collateral_per_leverage: self.policy.collateral_per_leverage,
            origination_fee: Bps(self.policy.origination_fee_bps),
            rebase_fee: Bps(self.policy.rebase_fee_bps),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            accounts: EngineAccounts {
                treasury: AccountId::new(&self.accounts.treasury),
                reserve: AccountId::new(&self.accounts.reserve),
                custody: AccountId::new(&self.accounts.custody),
                liquidator: AccountId::new(&self.accounts.liquidator),
            },
            max_slippage: Bps(self.swap.max_slippage_bps),
            time_to_live_days: self.positions.time_to_live_days,
        }
    }

    pub fn governance(&self) -> AccountId {
        AccountId::new(&self.accounts.governance)
    }

    /// Policy bounds, rate fractions, and distinct non-empty account names
    /// (including the simulator's own accounts).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy_params().validate()?;

        if !Bps(self.swap.max_slippage_bps).is_fraction() {
            return Err(ConfigError::Invalid(format!(
                "max_slippage_bps {} exceeds 10000",
                self.swap.max_slippage_bps
            )));
        }
        if !Bps(self.market.pool_fee_bps).is_fraction() {
            return Err(ConfigError::Invalid(format!(
                "pool_fee_bps {} exceeds 10000",
                self.market.pool_fee_bps
            )));
        }

        if self.positions.time_to_live_days > MAX_TIME_TO_LIVE_DAYS {
            return Err(ConfigError::Invalid(format!(
                "time_to_live_days {} exceeds {MAX_TIME_TO_LIVE_DAYS}",
                self.positions.time_to_live_days
            )));
        }

        let names = [
            ("treasury", &self.accounts.treasury),
            ("reserve", &self.accounts.reserve),
            ("custody", &self.accounts.custody),
            ("governance", &self.accounts.governance),
            ("liquidator", &self.accounts.liquidator),
        ];
        let mut seen: BTreeSet<&str> = [POOL_ACCOUNT, VAULT_ACCOUNT, LOSS_ACCOUNT].into();
        for (role, name) in names {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{role} account is empty")));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "{role} account '{name}' collides with another account"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let config = ProtocolConfig::default();
        assert_eq!(config.policy_params(), PolicyParams::default());
        assert_eq!(config.engine_config(), EngineConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_round_trip() {
        let config = ProtocolConfig::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[policy]"));
        assert!(text.contains("collateral_per_leverage = \"1\""));
        let parsed = ProtocolConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config = ProtocolConfig::from_toml(
            r#"
            [policy]
            max_cycles = 4
            origination_fee_bps = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.policy.max_cycles, 4);
        assert_eq!(config.policy.cycle_rate_bps, 9_000);
        assert_eq!(config.positions.time_to_live_days, 369);
        assert_eq!(config.accounts.treasury, "treasury");
    }

    #[test]
    fn rejects_zero_cycles() {
        let err = ProtocolConfig::from_toml("[policy]\nmax_cycles = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Policy(PolicyError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_rate_above_one() {
        let err = ProtocolConfig::from_toml("[policy]\ncycle_rate_bps = 10001").unwrap_err();
        assert!(matches!(err, ConfigError::Policy(PolicyError::InvalidRate { .. })));
    }

    #[test]
    fn rejects_colliding_accounts() {
        let err = ProtocolConfig::from_toml("[accounts]\ntreasury = \"reserve\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ProtocolConfig::from_toml("[accounts]\ncustody = \"vault\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_ttl_beyond_limit() {
        let err = ProtocolConfig::from_toml("[positions]\ntime_to_live_days = 4000000000")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(ProtocolConfig::from_toml("[positions]\ntime_to_live_days = 36500").is_ok());
    }

    #[test]
    fn rejects_unparseable_amount() {
        let err =
            ProtocolConfig::from_toml("[policy]\ncollateral_per_leverage = \"1.2.3\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
