//! Engine configuration, the open-request state machine, and receipts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::domain::{AccountId, Amount, Bps, PositionId, RequestId};
use crate::ledger::DEFAULT_TIME_TO_LIVE_DAYS;

/// Accounts the engine moves funds between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineAccounts {
    /// Receives collateral costs, origination fees, and rebase fees.
    pub treasury: AccountId,
    /// Shared debt reserve that cycles draw from and repayments return to.
    pub reserve: AccountId,
    /// The engine's own principal account between collaborator calls.
    pub custody: AccountId,
    /// May close positions once they have expired.
    pub liquidator: AccountId,
}

impl Default for EngineAccounts {
    fn default() -> Self {
        Self {
            treasury: AccountId::new("treasury"),
            reserve: AccountId::new("reserve"),
            custody: AccountId::new("engine"),
            liquidator: AccountId::new("liquidator"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub accounts: EngineAccounts,
    /// Worst acceptable swap output relative to the pool's spot price.
    pub max_slippage: Bps,
    pub time_to_live_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accounts: EngineAccounts::default(),
            max_slippage: Bps(100),
            time_to_live_days: DEFAULT_TIME_TO_LIVE_DAYS,
        }
    }
}

/// Lifecycle of one `open` request.
///
/// `Requested → PolicyChecked → CyclesExecuting(1..=n) → Finalized`, with
/// `Aborted` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "cycle", rename_all = "snake_case")]
pub enum OpenState {
    Requested,
    PolicyChecked,
    CyclesExecuting(u32),
    Finalized,
    Aborted,
}

impl OpenState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OpenState::Finalized | OpenState::Aborted)
    }

    pub fn can_transition_to(self, next: OpenState) -> bool {
        use OpenState::*;
        match (self, next) {
            (s, Aborted) => !s.is_terminal(),
            (Requested, PolicyChecked) => true,
            (PolicyChecked, CyclesExecuting(1)) => true,
            (CyclesExecuting(k), CyclesExecuting(j)) => j == k + 1,
            (PolicyChecked | CyclesExecuting(_), Finalized) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OpenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenState::Requested => write!(f, "requested"),
            OpenState::PolicyChecked => write!(f, "policy_checked"),
            OpenState::CyclesExecuting(k) => write!(f, "cycles_executing({k})"),
            OpenState::Finalized => write!(f, "finalized"),
            OpenState::Aborted => write!(f, "aborted"),
        }
    }
}

/// One recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAudit {
    pub request_id: RequestId,
    pub position_id: PositionId,
    pub from: Option<OpenState>,
    pub to: OpenState,
    pub reason: String,
}

/// Tracks an in-flight open request and the transitions it has made.
#[derive(Debug)]
pub(crate) struct OpenRequest {
    id: RequestId,
    position_id: PositionId,
    state: OpenState,
    trail: Vec<RequestAudit>,
}

impl OpenRequest {
    pub(crate) fn new(id: RequestId, position_id: PositionId) -> Self {
        let mut request = Self {
            id,
            position_id,
            state: OpenState::Requested,
            trail: Vec::new(),
        };
        request.record(None, OpenState::Requested, "received");
        request
    }

    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn state(&self) -> OpenState {
        self.state
    }

    pub(crate) fn advance(&mut self, to: OpenState, reason: impl Into<String>) {
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid open transition {} -> {}",
            self.state,
            to
        );
        let from = self.state;
        self.state = to;
        self.record(Some(from), to, reason);
    }

    fn record(&mut self, from: Option<OpenState>, to: OpenState, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(request = %self.id, position = %self.position_id, state = %to, %reason, "open request");
        self.trail.push(RequestAudit {
            request_id: self.id,
            position_id: self.position_id,
            from,
            to,
            reason,
        });
    }

    pub(crate) fn into_trail(self) -> Vec<RequestAudit> {
        self.trail
    }
}

/// How many shares a close redeems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Redeem {
    /// Full close: repay all debt and delete the position.
    All,
    /// Partial close of exactly this many shares.
    Exact(Amount),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReceipt {
    pub request_id: RequestId,
    pub position_id: PositionId,
    pub owner: AccountId,
    pub principal: Amount,
    pub cycles: u32,
    pub collateral_paid: Amount,
    pub borrowed: Amount,
    pub origination_fee: Amount,
    /// Principal booked on the position after fees.
    pub total_principal_value: Amount,
    pub shares: Amount,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReceipt {
    pub position_id: PositionId,
    pub owner: AccountId,
    pub closed_by: AccountId,
    pub shares_redeemed: Amount,
    pub principal_redeemed: Amount,
    /// Principal sold to buy back the repaid debt.
    pub swap_input: Amount,
    pub debt_repaid: Amount,
    /// Debt bought above the repayment, returned to the owner.
    pub debt_refund: Amount,
    /// Principal paid to the owner.
    pub payout: Amount,
    /// Book principal released from the position.
    pub principal_released: Amount,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub position_id: PositionId,
    pub amount: Amount,
    pub shares: Amount,
}
