//! Simulated world: an engine wired to in-memory collaborators, plus the
//! bookkeeping needed to check conservation after a run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use loopvault_core::collab::{ClockError, Collaborators, ExternalError, ManualClock, TokenLedger, YieldVault};
use loopvault_core::domain::{AccountId, Amount, Asset, Bps};
use loopvault_core::policy::LeveragePolicy;
use loopvault_core::sim::{SimPool, SimTokens, SimVault};
use loopvault_core::SimEngine;

use crate::config::{ConfigError, ProtocolConfig, LOSS_ACCOUNT, POOL_ACCOUNT, VAULT_ACCOUNT};

/// One named conservation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConservationCheck {
    pub name: String,
    pub expected: Amount,
    pub actual: Amount,
    pub passed: bool,
}

impl ConservationCheck {
    fn new(name: impl Into<String>, expected: Amount, actual: Amount) -> Self {
        Self {
            name: name.into(),
            expected,
            actual,
            passed: expected == actual,
        }
    }
}

pub struct World {
    pub engine: SimEngine,
    pub clock: ManualClock,
    minted: BTreeMap<Asset, Amount>,
    reserve_baseline: Amount,
}

impl World {
    /// Engine plus pool and reserve liquidity from `[market]`.
    pub fn new(config: &ProtocolConfig, start: DateTime<Utc>) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = LeveragePolicy::new(config.policy_params(), config.governance())?;
        let engine_config = config.engine_config();
        let market = &config.market;
        let pool_account = AccountId::new(POOL_ACCOUNT);

        let clock = ManualClock::new(start);
        let collab = Collaborators::new(
            SimTokens::new(),
            SimPool::new(
                pool_account.clone(),
                market.pool_debt_reserve,
                market.pool_principal_reserve,
                Bps(market.pool_fee_bps),
            ),
            SimVault::new(AccountId::new(VAULT_ACCOUNT)),
        );
        let reserve = engine_config.accounts.reserve.clone();
        let mut world = Self {
            engine: SimEngine::new(engine_config, policy, collab, clock.clone()),
            clock,
            minted: BTreeMap::new(),
            reserve_baseline: Amount::ZERO,
        };

        let seed = [
            (Asset::Debt, &pool_account, market.pool_debt_reserve),
            (Asset::Principal, &pool_account, market.pool_principal_reserve),
            (Asset::Debt, &reserve, market.reserve_debt),
        ];
        for (asset, account, amount) in seed {
            world
                .fund(account, asset, amount)
                .map_err(|e| ConfigError::Invalid(format!("market seed: {e}")))?;
        }
        Ok(world)
    }

    /// Mint `amount` of `asset` to `account`.
    pub fn fund(
        &mut self,
        account: &AccountId,
        asset: Asset,
        amount: Amount,
    ) -> Result<(), ExternalError> {
        if amount.is_zero() {
            return Ok(());
        }
        let minted = self.minted.get(&asset).copied().unwrap_or_default();
        let total = minted.checked_add(amount)?;
        self.engine.collaborators_mut().tokens.mint(asset, account, amount)?;
        self.minted.insert(asset, total);
        if *account == self.engine.config().accounts.reserve && asset == Asset::Debt {
            self.reserve_baseline = self.reserve_baseline.checked_add(amount)?;
        }
        Ok(())
    }

    /// Book vault yield and mint the matching principal into the vault.
    pub fn accrue(&mut self, gain: Amount) -> Result<(), ExternalError> {
        self.engine.collaborators_mut().vault.accrue(gain)?;
        self.fund(&AccountId::new(VAULT_ACCOUNT), Asset::Principal, gain)?;
        debug!(%gain, "vault accrued");
        Ok(())
    }

    /// Write down vault assets and move the lost principal out of the vault.
    pub fn write_down(&mut self, loss: Amount) -> Result<Amount, ExternalError> {
        let collab = self.engine.collaborators_mut();
        let lost = collab.vault.write_down(loss);
        collab.tokens.transfer(
            Asset::Principal,
            &AccountId::new(VAULT_ACCOUNT),
            &AccountId::new(LOSS_ACCOUNT),
            lost,
        )?;
        debug!(%lost, "vault written down");
        Ok(lost)
    }

    pub fn advance_days(&self, days: i64) -> Result<DateTime<Utc>, ClockError> {
        self.clock.advance_days(days)
    }

    pub fn balance(&self, asset: Asset, account: &AccountId) -> Amount {
        self.engine.collaborators().tokens.balance_of(asset, account)
    }

    pub fn minted(&self, asset: Asset) -> Amount {
        self.minted.get(&asset).copied().unwrap_or_default()
    }

    /// Checks that hold after any sequence of requests, successful or not:
    /// token supply equals what was minted, the reserve is short exactly the
    /// debt on the books, ledger shares match vault shares, and the vault
    /// holds the principal it reports.
    pub fn conservation(&self) -> Result<Vec<ConservationCheck>, ExternalError> {
        let collab = self.engine.collaborators();
        let ledger = self.engine.ledger();
        let mut checks = Vec::new();

        for asset in [Asset::Principal, Asset::Debt, Asset::Collateral] {
            checks.push(ConservationCheck::new(
                format!("{asset}_supply"),
                self.minted(asset),
                collab.tokens.supply(asset)?,
            ));
        }

        let reserve = &self.engine.config().accounts.reserve;
        checks.push(ConservationCheck::new(
            "reserve_debt_outstanding",
            ledger.total_borrowed()?,
            self.reserve_baseline
                .saturating_sub(collab.tokens.balance_of(Asset::Debt, reserve)),
        ));
        checks.push(ConservationCheck::new(
            "vault_shares",
            ledger.total_shares()?,
            collab.vault.total_shares(),
        ));
        checks.push(ConservationCheck::new(
            "vault_backing",
            collab.vault.total_assets(),
            collab.tokens.balance_of(Asset::Principal, collab.vault.account()),
        ));
        Ok(checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new(&ProtocolConfig::default(), Utc::now()).unwrap()
    }

    #[test]
    fn market_is_seeded() {
        let w = world();
        let pool = AccountId::new(POOL_ACCOUNT);
        assert_eq!(w.balance(Asset::Debt, &pool), Amount::from_units(1_000_000));
        assert_eq!(w.balance(Asset::Principal, &pool), Amount::from_units(1_000_000));
        assert_eq!(w.minted(Asset::Debt), Amount::from_units(2_000_000));
        assert!(w.conservation().unwrap().iter().all(|c| c.passed));
    }

    #[test]
    fn accrue_and_write_down_keep_vault_backed() {
        let mut w = world();
        let alice = AccountId::new("alice");
        w.fund(&alice, Asset::Principal, Amount::from_units(500)).unwrap();
        w.fund(&alice, Asset::Collateral, Amount::from_units(500)).unwrap();
        w.engine
            .open(&alice, Amount::from_units(100), 1, Amount::from_units(500))
            .unwrap();

        w.accrue(Amount::from_units(10)).unwrap();
        assert_eq!(w.write_down(Amount::from_units(4)).unwrap(), Amount::from_units(4));
        assert_eq!(
            w.balance(Asset::Principal, &AccountId::new(LOSS_ACCOUNT)),
            Amount::from_units(4)
        );
        let failed: Vec<_> = w
            .conservation()
            .unwrap()
            .into_iter()
            .filter(|c| !c.passed)
            .collect();
        assert!(failed.is_empty(), "{failed:?}");
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = ProtocolConfig::default();
        config.policy.max_cycles = 0;
        assert!(World::new(&config, Utc::now()).is_err());
    }
}
