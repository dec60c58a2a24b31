use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::collab::ExternalError;
use crate::domain::{AccountId, Amount, AmountError, PositionId};
use crate::error::ErrorKind;
use crate::ledger::LedgerError;
use crate::policy::PolicyError;

/// The collaborator call that failed. Cycle steps carry the 1-based cycle;
/// cycle 0 is the initial principal deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    CollateralTransfer,
    PrincipalTransfer,
    VaultDeposit { cycle: u32 },
    ReserveDraw { cycle: u32 },
    Swap { cycle: u32 },
    FeeTransfer { cycle: u32 },
    VaultRedeem,
    UnwindSwap,
    RepayTransfer,
    Payout,
    Settlement,
    Valuation,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::CollateralTransfer => write!(f, "collateral transfer"),
            Step::PrincipalTransfer => write!(f, "principal transfer"),
            Step::VaultDeposit { cycle } => write!(f, "vault deposit (cycle {cycle})"),
            Step::ReserveDraw { cycle } => write!(f, "reserve draw (cycle {cycle})"),
            Step::Swap { cycle } => write!(f, "swap (cycle {cycle})"),
            Step::FeeTransfer { cycle } => write!(f, "fee transfer (cycle {cycle})"),
            Step::VaultRedeem => write!(f, "vault redeem"),
            Step::UnwindSwap => write!(f, "unwind swap"),
            Step::RepayTransfer => write!(f, "repay transfer"),
            Step::Payout => write!(f, "payout"),
            Step::Settlement => write!(f, "rebase settlement"),
            Step::Valuation => write!(f, "share valuation"),
        }
    }
}

/// Errors from leverage engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("offered collateral {offered} is below the required {required}")]
    InsufficientCollateral { offered: Amount, required: Amount },

    #[error("{step} failed: {source}")]
    ExternalCallFailed {
        step: Step,
        #[source]
        source: ExternalError,
    },

    #[error("cycle {cycle} swap returned {output}, less than its {fee} fee")]
    FeeExceedsOutput {
        cycle: u32,
        fee: Amount,
        output: Amount,
    },

    #[error("position {id} redeemed {available}, repaying its debt needs {needed}")]
    Underwater {
        id: PositionId,
        needed: Amount,
        available: Amount,
    },

    #[error("'{caller}' may not act on position {id}")]
    Unauthorized { caller: AccountId, id: PositionId },

    #[error("position {id} does not expire until {expires_at}")]
    NotExpired {
        id: PositionId,
        expires_at: DateTime<Utc>,
    },

    #[error("{0} must be non-zero")]
    ZeroAmount(&'static str),

    #[error("arithmetic overflow")]
    Overflow,

    #[error("rollback after '{original}' failed: {source}")]
    RollbackFailed {
        original: Box<EngineError>,
        #[source]
        source: ExternalError,
    },
}

impl From<AmountError> for EngineError {
    fn from(_: AmountError) -> Self {
        EngineError::Overflow
    }
}

impl EngineError {
    pub(crate) fn external(step: Step) -> impl FnOnce(ExternalError) -> EngineError {
        move |source| EngineError::ExternalCallFailed { step, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Ledger(e) => e.kind(),
            EngineError::Policy(e) => e.kind(),
            EngineError::InsufficientCollateral { .. } => ErrorKind::InsufficientCollateral,
            EngineError::ExternalCallFailed { .. } | EngineError::RollbackFailed { .. } => {
                ErrorKind::ExternalCallFailed
            }
            EngineError::FeeExceedsOutput { .. } | EngineError::Underwater { .. } => {
                ErrorKind::InsufficientBalance
            }
            EngineError::Unauthorized { .. } => ErrorKind::Unauthorized,
            EngineError::NotExpired { .. } => ErrorKind::NotExpired,
            EngineError::ZeroAmount(_) => ErrorKind::InvalidAmount,
            EngineError::Overflow => ErrorKind::Overflow,
        }
    }

    /// The failing collaborator step, if this is an external failure.
    pub fn step(&self) -> Option<Step> {
        match self {
            EngineError::ExternalCallFailed { step, .. } => Some(*step),
            EngineError::RollbackFailed { original, .. } => original.step(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_failure_names_the_step() {
        let err = EngineError::external(Step::Swap { cycle: 2 })(ExternalError::Unavailable(
            "down".into(),
        ));
        assert_eq!(err.kind(), ErrorKind::ExternalCallFailed);
        assert_eq!(err.step(), Some(Step::Swap { cycle: 2 }));
        assert_eq!(err.to_string(), "swap (cycle 2) failed: down");
    }

    #[test]
    fn wrapped_module_errors_keep_their_kind() {
        let err: EngineError = LedgerError::NotFound(PositionId(3)).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err: EngineError = PolicyError::Unauthorized(AccountId::new("x")).into();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
