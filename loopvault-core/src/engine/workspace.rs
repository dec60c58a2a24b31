//! Scope of one engine request.
//!
//! A `Workspace` holds the ledger transaction together with mutable access
//! to the collaborators and the settlement watermark. Every fund movement of
//! a request goes through it, so the request sees its own staged ledger
//! state while nothing outside can. [`Workspace::run`] commits the ledger
//! only if the whole body succeeds; collaborator rollback is the engine's
//! job, since it owns the checkpoints.

use tracing::debug;

use super::error::{EngineError, Step};
use super::state::{EngineAccounts, EngineConfig};
use crate::collab::{AmmPool, Collaborators, TokenLedger, YieldVault};
use crate::domain::{AccountId, Amount, Asset, Bps};
use crate::ledger::{LedgerTransaction, PositionLedger};
use crate::settlement::{RebaseSettlement, SettlementError, SettlementOutcome};

pub(crate) struct Workspace<'a, T, P, V> {
    pub(crate) tx: LedgerTransaction<'a>,
    pub(crate) collab: &'a mut Collaborators<T, P, V>,
    settlement: &'a mut RebaseSettlement,
    pub(crate) accounts: &'a EngineAccounts,
    pub(crate) max_slippage: Bps,
}

impl<'a, T: TokenLedger, P: AmmPool, V: YieldVault> Workspace<'a, T, P, V> {
    pub(crate) fn new(
        ledger: &'a mut PositionLedger,
        collab: &'a mut Collaborators<T, P, V>,
        settlement: &'a mut RebaseSettlement,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            tx: ledger.begin(),
            collab,
            settlement,
            accounts: &config.accounts,
            max_slippage: config.max_slippage,
        }
    }

    /// Run `body` and commit the ledger transaction if it succeeds.
    pub(crate) fn run<R>(
        mut self,
        body: impl FnOnce(&mut Self) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let out = body(&mut self)?;
        let written = self.tx.commit();
        debug!(positions = written, "ledger transaction committed");
        Ok(out)
    }

    pub(crate) fn transfer(
        &mut self,
        step: Step,
        asset: Asset,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        if amount.is_zero() {
            return Ok(());
        }
        self.collab
            .tokens
            .transfer(asset, from, to, amount)
            .map_err(EngineError::external(step))
    }

    /// Move `amount` principal from custody into the vault. Returns shares.
    pub(crate) fn deposit(&mut self, step: Step, amount: Amount) -> Result<Amount, EngineError> {
        let accounts = self.accounts;
        let vault_account = self.collab.vault.account().clone();
        self.transfer(step, Asset::Principal, &accounts.custody, &vault_account, amount)?;
        let shares = self
            .collab
            .vault
            .deposit(amount)
            .map_err(EngineError::external(step))?;
        self.settlement.record_inflow(amount)?;
        Ok(shares)
    }

    /// Redeem `shares` from the vault into custody. Returns the principal.
    pub(crate) fn redeem(&mut self, shares: Amount) -> Result<Amount, EngineError> {
        let accounts = self.accounts;
        let value = self
            .collab
            .vault
            .redeem(shares)
            .map_err(EngineError::external(Step::VaultRedeem))?;
        let vault_account = self.collab.vault.account().clone();
        self.transfer(Step::VaultRedeem, Asset::Principal, &vault_account, &accounts.custody, value)?;
        self.settlement.record_outflow(value);
        Ok(value)
    }

    /// Send `amount_in` from `from` into the pool and swap it. The output is
    /// left in the pool account for the caller to route.
    pub(crate) fn swap(
        &mut self,
        in_step: Step,
        swap_step: Step,
        from: &AccountId,
        amount_in: Amount,
        asset_in: Asset,
        asset_out: Asset,
    ) -> Result<Amount, EngineError> {
        let pool_account = self.pool_account();
        self.transfer(in_step, asset_in, from, &pool_account, amount_in)?;
        self.collab
            .pool
            .swap(amount_in, asset_in, asset_out, self.max_slippage)
            .map_err(EngineError::external(swap_step))
    }

    pub(crate) fn pool_account(&self) -> AccountId {
        self.collab.pool.account().clone()
    }

    /// Skim the rebase fee on any vault growth since the last settlement.
    pub(crate) fn settle(&mut self, rate: Bps) -> Result<SettlementOutcome, EngineError> {
        let treasury = &self.accounts.treasury;
        let Collaborators { tokens, vault, .. } = &mut *self.collab;
        self.settlement
            .settle(rate, tokens, vault, treasury)
            .map_err(|e| match e {
                SettlementError::External(source) => EngineError::ExternalCallFailed {
                    step: Step::Settlement,
                    source,
                },
                SettlementError::Overflow => EngineError::Overflow,
            })
    }
}
