//! Closing and partially withdrawing positions.

use chrono::{DateTime, Utc};
use tracing::info;

use super::error::{EngineError, Step};
use super::state::{CloseReceipt, Redeem};
use super::workspace::Workspace;
use super::LeverageEngine;
use crate::collab::{AmmPool, ExternalError, TokenLedger, YieldVault};
use crate::domain::{AccountId, Amount, Asset, PositionId, PositionRecord};
use crate::ledger::LedgerError;

impl<T: TokenLedger, P: AmmPool, V: YieldVault> LeverageEngine<T, P, V> {
    /// Redeem shares from a position, repay the matching debt, and pay the
    /// rest to the owner.
    ///
    /// The owner may always close. The liquidator may close once the
    /// position has expired; proceeds still go to the owner. `Redeem::All`
    /// repays everything and deletes the position.
    pub fn close(
        &mut self,
        caller: &AccountId,
        id: PositionId,
        redeem: Redeem,
    ) -> Result<CloseReceipt, EngineError> {
        let record = self.record(id)?.clone();
        let owner = self
            .owners
            .get(&id)
            .cloned()
            .ok_or(LedgerError::NotFound(id))?;
        self.authorize_close(caller, &owner, id, &record, self.clock.now())?;

        let full = matches!(redeem, Redeem::All);
        let shares = match redeem {
            Redeem::All => record.yield_shares,
            Redeem::Exact(n) if n.is_zero() => return Err(EngineError::ZeroAmount("shares")),
            Redeem::Exact(n) if n > record.yield_shares => {
                return Err(LedgerError::InsufficientShares {
                    id,
                    requested: n,
                    available: record.yield_shares,
                }
                .into())
            }
            Redeem::Exact(n) => n,
        };

        let checkpoint = self.collab.checkpoint();
        let saved = self.settlement.clone();
        let rebase_fee = self.policy.rebase_fee_rate();
        let result = Workspace::new(
            &mut self.ledger,
            &mut self.collab,
            &mut self.settlement,
            &self.config,
        )
        .run(|ws| {
            ws.settle(rebase_fee)?;
            ws.close_position(id, &owner, caller, shares, full)
        });
        let receipt = self.finish(checkpoint, saved, result)?;

        if receipt.deleted {
            self.owners.remove(&id);
        }
        info!(
            position = %id,
            by = %caller,
            shares = %receipt.shares_redeemed,
            repaid = %receipt.debt_repaid,
            payout = %receipt.payout,
            deleted = receipt.deleted,
            "position closed"
        );
        Ok(receipt)
    }

    /// Partial close of exactly `shares`.
    pub fn withdraw(
        &mut self,
        caller: &AccountId,
        id: PositionId,
        shares: Amount,
    ) -> Result<CloseReceipt, EngineError> {
        self.close(caller, id, Redeem::Exact(shares))
    }

    fn authorize_close(
        &self,
        caller: &AccountId,
        owner: &AccountId,
        id: PositionId,
        record: &PositionRecord,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if caller == owner {
            return Ok(());
        }
        if caller == &self.config.accounts.liquidator {
            if record.is_expired(now) {
                return Ok(());
            }
            return Err(EngineError::NotExpired {
                id,
                expires_at: record.expires_at(),
            });
        }
        Err(EngineError::Unauthorized {
            caller: caller.clone(),
            id,
        })
    }
}

impl<'a, T: TokenLedger, P: AmmPool, V: YieldVault> Workspace<'a, T, P, V> {
    fn close_position(
        &mut self,
        id: PositionId,
        owner: &AccountId,
        caller: &AccountId,
        shares: Amount,
        full: bool,
    ) -> Result<CloseReceipt, EngineError> {
        let record = self.tx.get(id).cloned().ok_or(LedgerError::NotFound(id))?;
        let accounts = self.accounts;
        let pool = self.pool_account();

        let redeemed = if shares.is_zero() {
            Amount::ZERO
        } else {
            self.redeem(shares)?
        };

        // Partial closes repay their share of the debt rounded up, so the
        // remaining position never ends up with more debt per share.
        let debt = if full {
            record.borrowed
        } else {
            record
                .borrowed
                .mul_div_ceil(shares.raw(), record.yield_shares.raw())?
                .min(record.borrowed)
        };

        let (swap_input, debt_bought) = if debt.is_zero() {
            (Amount::ZERO, Amount::ZERO)
        } else {
            let input = self
                .collab
                .pool
                .quote_exact_out(debt, Asset::Principal, Asset::Debt)
                .map_err(EngineError::external(Step::UnwindSwap))?;
            if input > redeemed {
                return Err(EngineError::Underwater {
                    id,
                    needed: input,
                    available: redeemed,
                });
            }
            let out = self.swap(
                Step::UnwindSwap,
                Step::UnwindSwap,
                &accounts.custody,
                input,
                Asset::Principal,
                Asset::Debt,
            )?;
            if out < debt {
                return Err(EngineError::ExternalCallFailed {
                    step: Step::UnwindSwap,
                    source: ExternalError::SlippageExceeded {
                        min_out: debt,
                        out,
                    },
                });
            }
            self.transfer(Step::RepayTransfer, Asset::Debt, &pool, &accounts.reserve, debt)?;
            (input, out)
        };
        let debt_refund = debt_bought.saturating_sub(debt);
        self.transfer(Step::Payout, Asset::Debt, &pool, owner, debt_refund)?;

        let principal_released = if full {
            record.total_principal_value
        } else {
            record
                .total_principal_value
                .mul_div_floor(shares.raw(), record.yield_shares.raw())?
        };
        self.tx.remove_shares(id, shares)?;
        self.tx.repay(id, debt)?;
        self.tx.withdraw_principal(id, principal_released)?;

        let payout = redeemed.saturating_sub(swap_input);
        self.transfer(Step::Payout, Asset::Principal, &accounts.custody, owner, payout)?;

        if full {
            self.tx.delete_position(id)?;
        }

        Ok(CloseReceipt {
            position_id: id,
            owner: owner.clone(),
            closed_by: caller.clone(),
            shares_redeemed: shares,
            principal_redeemed: redeemed,
            swap_input,
            debt_repaid: debt,
            debt_refund,
            payout,
            principal_released,
            deleted: full,
        })
    }
}
