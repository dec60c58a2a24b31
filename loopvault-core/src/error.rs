//! Flat classification of every error the engine can return.
//!
//! Module errors carry context (ids, amounts, the failing step); `ErrorKind`
//! strips that down to a stable name for scenario expectations, reports,
//! and callers that only need to branch on the category.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::AmountError;
use crate::ledger::LedgerError;
use crate::policy::PolicyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    OutstandingDebt,
    InsufficientDebt,
    InsufficientBalance,
    InsufficientShares,
    CycleLimitExceeded,
    InsufficientCollateral,
    Overflow,
    ExternalCallFailed,
    Unauthorized,
    NotExpired,
    InvalidConfig,
    InvalidAmount,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::OutstandingDebt => "outstanding_debt",
            ErrorKind::InsufficientDebt => "insufficient_debt",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::InsufficientShares => "insufficient_shares",
            ErrorKind::CycleLimitExceeded => "cycle_limit_exceeded",
            ErrorKind::InsufficientCollateral => "insufficient_collateral",
            ErrorKind::Overflow => "overflow",
            ErrorKind::ExternalCallFailed => "external_call_failed",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotExpired => "not_expired",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::InvalidAmount => "invalid_amount",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AmountError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AmountError::Parse { .. } => ErrorKind::InvalidAmount,
            AmountError::Overflow | AmountError::DivisionByZero => ErrorKind::Overflow,
        }
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::OutstandingDebt { .. } => ErrorKind::OutstandingDebt,
            LedgerError::InsufficientDebt { .. } => ErrorKind::InsufficientDebt,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::InsufficientShares { .. } => ErrorKind::InsufficientShares,
            LedgerError::Overflow(_) => ErrorKind::Overflow,
        }
    }
}

impl PolicyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PolicyError::CycleLimitExceeded { .. } => ErrorKind::CycleLimitExceeded,
            PolicyError::Overflow => ErrorKind::Overflow,
            PolicyError::Unauthorized(_) => ErrorKind::Unauthorized,
            PolicyError::InvalidRate { .. } | PolicyError::InvalidConfig(_) => {
                ErrorKind::InvalidConfig
            }
        }
    }
}
