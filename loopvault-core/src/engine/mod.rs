//! Leverage orchestrator.
//!
//! `LeverageEngine` owns the position ledger, the policy module, the rebase
//! settlement, and the owner registry, and drives the collaborators through
//! multi-step requests:
//!
//! - `open`: take collateral and principal, then loop cycles of
//!   borrow → swap → deposit
//! - `close` / `withdraw`: redeem shares, buy back and repay debt, pay out
//! - `deposit_to_position`: top up principal
//! - `settle_rebase`: skim the protocol's cut of vault yield
//!
//! Each request runs inside a [`Workspace`]: a ledger transaction plus
//! checkpoints of every collaborator. Either the whole request applies or
//! none of it does.

mod close;
pub mod error;
mod open;
pub mod state;
mod workspace;

pub use error::{EngineError, Step};
pub use state::{
    CloseReceipt, DepositReceipt, EngineAccounts, EngineConfig, OpenReceipt, OpenState, Redeem,
    RequestAudit,
};

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::collab::{AmmPool, Clock, CollabCheckpoint, Collaborators, TokenLedger, YieldVault};
use crate::domain::{AccountId, Amount, Asset, Bps, IdGen, PositionId, PositionRecord};
use crate::ledger::{LedgerError, PositionLedger};
use crate::policy::{LeveragePolicy, LeverageQuote};
use crate::settlement::{RebaseSettlement, SettlementOutcome};
use workspace::Workspace;

pub struct LeverageEngine<T, P, V> {
    config: EngineConfig,
    policy: LeveragePolicy,
    ledger: PositionLedger,
    settlement: RebaseSettlement,
    owners: BTreeMap<PositionId, AccountId>,
    position_ids: IdGen,
    request_ids: IdGen,
    audit: Vec<RequestAudit>,
    clock: Box<dyn Clock>,
    collab: Collaborators<T, P, V>,
}

impl<T: TokenLedger, P: AmmPool, V: YieldVault> LeverageEngine<T, P, V> {
    /// The settlement watermark starts at the vault's current assets, so
    /// yield accrued before the engine existed is never charged.
    pub fn new(
        config: EngineConfig,
        policy: LeveragePolicy,
        collab: Collaborators<T, P, V>,
        clock: impl Clock + 'static,
    ) -> Self {
        let watermark = collab.vault.total_assets();
        Self {
            ledger: PositionLedger::new(config.time_to_live_days),
            settlement: RebaseSettlement::new(watermark),
            owners: BTreeMap::new(),
            position_ids: IdGen::default(),
            request_ids: IdGen::default(),
            audit: Vec::new(),
            clock: Box::new(clock),
            config,
            policy,
            collab,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &LeveragePolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn settlement(&self) -> &RebaseSettlement {
        &self.settlement
    }

    pub fn collaborators(&self) -> &Collaborators<T, P, V> {
        &self.collab
    }

    /// Direct access for simulations (minting, accruing yield). Changes made
    /// here bypass the ledger.
    pub fn collaborators_mut(&mut self) -> &mut Collaborators<T, P, V> {
        &mut self.collab
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Every open-request transition so far, oldest first.
    pub fn audit_trail(&self) -> &[RequestAudit] {
        &self.audit
    }

    /// Hand over the recorded transitions and start a fresh trail.
    pub fn take_audit_trail(&mut self) -> Vec<RequestAudit> {
        std::mem::take(&mut self.audit)
    }

    // ── Policy ───────────────────────────────────────────────────────

    /// Leverage, collateral cost, and fee for a prospective open.
    pub fn quote(&self, principal: Amount, cycles: u32) -> Result<LeverageQuote, EngineError> {
        Ok(self.policy.quote(principal, cycles)?)
    }

    pub fn set_collateral_per_leverage(
        &mut self,
        caller: &AccountId,
        ratio: Amount,
    ) -> Result<(), EngineError> {
        self.policy.set_collateral_per_leverage(caller, ratio)?;
        info!(%caller, %ratio, "collateral ratio updated");
        Ok(())
    }

    pub fn set_fee_rates(
        &mut self,
        caller: &AccountId,
        origination: Bps,
        rebase: Bps,
    ) -> Result<(), EngineError> {
        self.policy.set_fee_rates(caller, origination, rebase)?;
        info!(%caller, %origination, %rebase, "fee rates updated");
        Ok(())
    }

    // ── Ownership ────────────────────────────────────────────────────

    pub fn owner_of(&self, id: PositionId) -> Option<&AccountId> {
        self.owners.get(&id)
    }

    pub fn positions_of(&self, owner: &AccountId) -> Vec<PositionId> {
        self.owners
            .iter()
            .filter(|(_, o)| *o == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn transfer_position(
        &mut self,
        caller: &AccountId,
        id: PositionId,
        to: &AccountId,
    ) -> Result<(), EngineError> {
        self.require_owner(caller, id)?;
        self.owners.insert(id, to.clone());
        info!(position = %id, from = %caller, %to, "position transferred");
        Ok(())
    }

    fn require_owner(&self, caller: &AccountId, id: PositionId) -> Result<(), EngineError> {
        let owner = self
            .owners
            .get(&id)
            .ok_or(LedgerError::NotFound(id))?;
        if owner != caller {
            return Err(EngineError::Unauthorized {
                caller: caller.clone(),
                id,
            });
        }
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    fn record(&self, id: PositionId) -> Result<&PositionRecord, EngineError> {
        Ok(self.ledger.get(id).ok_or(LedgerError::NotFound(id))?)
    }

    pub fn get_principal(&self, id: PositionId) -> Result<Amount, EngineError> {
        Ok(self.record(id)?.principal)
    }

    pub fn get_total_principal_value(&self, id: PositionId) -> Result<Amount, EngineError> {
        Ok(self.record(id)?.total_principal_value)
    }

    pub fn get_borrowed(&self, id: PositionId) -> Result<Amount, EngineError> {
        Ok(self.record(id)?.borrowed)
    }

    pub fn get_shares(&self, id: PositionId) -> Result<Amount, EngineError> {
        Ok(self.record(id)?.yield_shares)
    }

    pub fn get_time_opened(&self, id: PositionId) -> Result<DateTime<Utc>, EngineError> {
        Ok(self.record(id)?.opened_at)
    }

    pub fn get_time_to_live(&self, id: PositionId) -> Result<Duration, EngineError> {
        Ok(self.record(id)?.time_to_live())
    }

    pub fn get_expire_time(&self, id: PositionId) -> Result<DateTime<Utc>, EngineError> {
        Ok(self.record(id)?.expires_at())
    }

    pub fn is_expired(&self, id: PositionId) -> Result<bool, EngineError> {
        Ok(self.record(id)?.is_expired(self.clock.now()))
    }

    /// Current vault value of the position's shares.
    pub fn get_total(&self, id: PositionId) -> Result<Amount, EngineError> {
        let shares = self.record(id)?.yield_shares;
        self.collab
            .vault
            .preview_value(shares)
            .map_err(EngineError::external(Step::Valuation))
    }

    /// Share value above the booked principal, floored at zero.
    pub fn get_interest_earned(&self, id: PositionId) -> Result<Amount, EngineError> {
        let booked = self.record(id)?.total_principal_value;
        Ok(self.get_total(id)?.saturating_sub(booked))
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Settle pending rebase fees on their own.
    pub fn settle_rebase(&mut self) -> Result<SettlementOutcome, EngineError> {
        let checkpoint = self.collab.checkpoint();
        let saved = self.settlement.clone();
        let rate = self.policy.rebase_fee_rate();
        let result = Workspace::new(
            &mut self.ledger,
            &mut self.collab,
            &mut self.settlement,
            &self.config,
        )
        .run(|ws| ws.settle(rate));
        self.finish(checkpoint, saved, result)
    }

    /// Add `amount` principal to a position the caller owns.
    pub fn deposit_to_position(
        &mut self,
        caller: &AccountId,
        id: PositionId,
        amount: Amount,
    ) -> Result<DepositReceipt, EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount("deposit"));
        }
        self.require_owner(caller, id)?;
        self.record(id)?;

        let checkpoint = self.collab.checkpoint();
        let saved = self.settlement.clone();
        let rate = self.policy.rebase_fee_rate();
        let result = Workspace::new(
            &mut self.ledger,
            &mut self.collab,
            &mut self.settlement,
            &self.config,
        )
        .run(|ws| {
            ws.settle(rate)?;
            let accounts = ws.accounts;
            ws.transfer(
                Step::PrincipalTransfer,
                Asset::Principal,
                caller,
                &accounts.custody,
                amount,
            )?;
            let shares = ws.deposit(Step::VaultDeposit { cycle: 0 }, amount)?;
            ws.tx.deposit_principal(id, amount)?;
            ws.tx.add_shares(id, shares)?;
            Ok(DepositReceipt {
                position_id: id,
                amount,
                shares,
            })
        });
        let receipt = self.finish(checkpoint, saved, result)?;
        info!(position = %id, %amount, shares = %receipt.shares, "principal deposited");
        Ok(receipt)
    }

    /// Release checkpoints on success, undo everything on failure.
    fn finish<R>(
        &mut self,
        checkpoint: CollabCheckpoint,
        saved: RebaseSettlement,
        result: Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        match result {
            Ok(out) => {
                self.collab.release(checkpoint);
                Ok(out)
            }
            Err(err) => {
                self.settlement = saved;
                match self.collab.revert_to(checkpoint) {
                    Ok(()) => {
                        warn!(error = %err, "request rolled back");
                        Err(err)
                    }
                    Err(source) => {
                        error!(error = %err, %source, "rollback failed");
                        Err(EngineError::RollbackFailed {
                            original: Box::new(err),
                            source,
                        })
                    }
                }
            }
        }
    }
}
