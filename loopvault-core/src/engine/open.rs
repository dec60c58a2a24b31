//! Opening a leveraged position.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::error::{EngineError, Step};
use super::state::{OpenReceipt, OpenRequest, OpenState};
use super::workspace::Workspace;
use super::LeverageEngine;
use crate::collab::{AmmPool, TokenLedger, YieldVault};
use crate::domain::{AccountId, Amount, Asset, PositionId, RequestId};
use crate::ledger::LedgerError;
use crate::policy::{LeveragePolicy, LeverageQuote};

impl<T: TokenLedger, P: AmmPool, V: YieldVault> LeverageEngine<T, P, V> {
    /// Open a position of `principal` levered over `cycles` cycles.
    ///
    /// `offered_collateral` must cover the policy's collateral cost; only the
    /// cost itself is taken. On failure nothing is left behind: balances,
    /// ledger, and watermark are as they were, and the audit trail ends in
    /// `Aborted`.
    pub fn open(
        &mut self,
        caller: &AccountId,
        principal: Amount,
        cycles: u32,
        offered_collateral: Amount,
    ) -> Result<OpenReceipt, EngineError> {
        let position_id = PositionId(self.position_ids.peek());
        let mut request = OpenRequest::new(RequestId(self.request_ids.next_id()), position_id);

        let result = self.run_open(&mut request, caller, principal, cycles, offered_collateral);
        match &result {
            Ok(receipt) => {
                request.advance(
                    OpenState::Finalized,
                    format!("borrowed {} over {} cycles", receipt.borrowed, receipt.cycles),
                );
                info!(
                    request = %request.id(),
                    position = %receipt.position_id,
                    owner = %caller,
                    principal = %receipt.principal,
                    borrowed = %receipt.borrowed,
                    fee = %receipt.origination_fee,
                    "position opened"
                );
            }
            Err(err) => {
                let at = request.state();
                request.advance(OpenState::Aborted, err.to_string());
                warn!(request = %request.id(), state = %at, error = %err, "open aborted");
            }
        }
        self.audit.extend(request.into_trail());
        result
    }

    fn run_open(
        &mut self,
        request: &mut OpenRequest,
        caller: &AccountId,
        principal: Amount,
        cycles: u32,
        offered_collateral: Amount,
    ) -> Result<OpenReceipt, EngineError> {
        if principal.is_zero() {
            return Err(EngineError::ZeroAmount("principal"));
        }
        let quote = self.policy.quote(principal, cycles)?;
        if offered_collateral < quote.collateral_cost {
            return Err(EngineError::InsufficientCollateral {
                offered: offered_collateral,
                required: quote.collateral_cost,
            });
        }
        request.advance(
            OpenState::PolicyChecked,
            format!("leverage {} costs {} collateral", quote.leverage, quote.collateral_cost),
        );

        let checkpoint = self.collab.checkpoint();
        let saved = self.settlement.clone();
        let rebase_fee = self.policy.rebase_fee_rate();
        let id = PositionId(self.position_ids.peek());
        let now = self.clock.now();
        let policy = &self.policy;

        let result = Workspace::new(
            &mut self.ledger,
            &mut self.collab,
            &mut self.settlement,
            &self.config,
        )
        .run(|ws| {
            ws.settle(rebase_fee)?;
            ws.open_position(request, policy, caller, id, &quote, now)
        });

        let receipt = self.finish(checkpoint, saved, result)?;
        self.position_ids.next_id();
        self.owners.insert(id, caller.clone());
        Ok(receipt)
    }
}

impl<'a, T: TokenLedger, P: AmmPool, V: YieldVault> Workspace<'a, T, P, V> {
    fn open_position(
        &mut self,
        request: &mut OpenRequest,
        policy: &LeveragePolicy,
        owner: &AccountId,
        id: PositionId,
        quote: &LeverageQuote,
        now: DateTime<Utc>,
    ) -> Result<OpenReceipt, EngineError> {
        let accounts = self.accounts;
        let pool = self.pool_account();

        self.transfer(
            Step::CollateralTransfer,
            Asset::Collateral,
            owner,
            &accounts.treasury,
            quote.collateral_cost,
        )?;
        self.transfer(
            Step::PrincipalTransfer,
            Asset::Principal,
            owner,
            &accounts.custody,
            quote.principal,
        )?;
        let shares = self.deposit(Step::VaultDeposit { cycle: 0 }, quote.principal)?;
        self.tx.create_position(id, quote.principal, now)?;
        self.tx.add_shares(id, shares)?;

        // The fee is charged on cumulative debt so the per-cycle slices sum
        // to exactly the fee on the total.
        let mut borrowed = Amount::ZERO;
        let mut fee_charged = Amount::ZERO;

        for (cycle, draw) in (1u32..).zip(quote.schedule.iter().copied()) {
            request.advance(OpenState::CyclesExecuting(cycle), format!("draw {draw}"));
            if draw.is_zero() {
                continue;
            }

            let out = self.swap(
                Step::ReserveDraw { cycle },
                Step::Swap { cycle },
                &accounts.reserve,
                draw,
                Asset::Debt,
                Asset::Principal,
            )?;
            self.transfer(Step::Swap { cycle }, Asset::Principal, &pool, &accounts.custody, out)?;

            borrowed = borrowed.checked_add(draw)?;
            let fee_due = policy.origination_fee(borrowed)?;
            let fee = fee_due.saturating_sub(fee_charged);
            let net = out.checked_sub(fee).ok_or(EngineError::FeeExceedsOutput {
                cycle,
                fee,
                output: out,
            })?;
            self.transfer(
                Step::FeeTransfer { cycle },
                Asset::Principal,
                &accounts.custody,
                &accounts.treasury,
                fee,
            )?;
            fee_charged = fee_due;

            let minted = self.deposit(Step::VaultDeposit { cycle }, net)?;
            self.tx.borrow(id, draw)?;
            self.tx.deposit_principal(id, net)?;
            self.tx.add_shares(id, minted)?;
            debug!(position = %id, cycle, %draw, %out, %fee, shares = %minted, "cycle executed");
        }

        let record = self.tx.get(id).ok_or(LedgerError::NotFound(id))?;
        Ok(OpenReceipt {
            request_id: request.id(),
            position_id: id,
            owner: owner.clone(),
            principal: quote.principal,
            cycles: quote.cycles,
            collateral_paid: quote.collateral_cost,
            borrowed: record.borrowed,
            origination_fee: fee_charged,
            total_principal_value: record.total_principal_value,
            shares: record.yield_shares,
            opened_at: now,
        })
    }
}
